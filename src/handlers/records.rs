//! Single monthly record handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ledger::{LedgerService, MonthlyLoanRecord, UpdateRecordRequest};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;

pub async fn get_record(
    user: AuthenticatedUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MonthlyLoanRecord>>, ApiError> {
    let record = ledger.get_record(id).await?;
    user.ensure_can_view(record.member_id)?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn update_record(
    admin: AdminUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRecordRequest>,
) -> Result<Json<ApiResponse<MonthlyLoanRecord>>, ApiError> {
    let record = ledger.update_record(id, request, admin.id()).await?;
    Ok(Json(ApiResponse::ok(record)))
}

pub async fn finalize_record(
    admin: AdminUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MonthlyLoanRecord>>, ApiError> {
    let record = ledger.finalize_record(id, admin.id()).await?;
    Ok(Json(ApiResponse::ok(record)))
}
