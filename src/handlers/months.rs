//! Monthly cycle handlers: initialize, list, summarize, refresh

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::parse_period_key;
use crate::error::ApiError;
use crate::ledger::{
    InitializeMonthRequest, InitializeMonthResponse, LedgerService, PeriodSummary, RecordFilter,
    RecordWithMember, RefreshResponse,
};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;

pub async fn list_periods(
    _user: AuthenticatedUser,
    State(ledger): State<Arc<LedgerService>>,
) -> Result<Json<ApiResponse<Vec<PeriodSummary>>>, ApiError> {
    let periods = ledger.list_periods().await?;
    Ok(Json(ApiResponse::ok(periods)))
}

pub async fn initialize_month(
    admin: AdminUser,
    State(ledger): State<Arc<LedgerService>>,
    Json(request): Json<InitializeMonthRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InitializeMonthResponse>>), ApiError> {
    let result = ledger.initialize_month(request.period_key, admin.id()).await?;
    let status = if result.records_created > 0 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApiResponse::ok(result))))
}

pub async fn period_summary(
    _user: AuthenticatedUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(period_key): Path<String>,
) -> Result<Json<ApiResponse<PeriodSummary>>, ApiError> {
    let period = parse_period_key(&period_key)?;
    let summary = ledger.period_summary(period).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// Records of a period. Members only ever see their own line.
pub async fn list_period_records(
    user: AuthenticatedUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(period_key): Path<String>,
    Query(mut filter): Query<RecordFilter>,
) -> Result<Json<ApiResponse<Vec<RecordWithMember>>>, ApiError> {
    let period = parse_period_key(&period_key)?;
    filter.member_id = user.scope_member_filter(filter.member_id)?;
    let records = ledger.list_records(period, &filter).await?;
    Ok(Json(ApiResponse::ok(records)))
}

pub async fn refresh_period(
    admin: AdminUser,
    State(ledger): State<Arc<LedgerService>>,
    Path(period_key): Path<String>,
) -> Result<Json<ApiResponse<RefreshResponse>>, ApiError> {
    let period = parse_period_key(&period_key)?;
    let result = ledger.refresh_period(period).await?;
    tracing::info!(
        period_key = %period,
        admin_id = %admin.id(),
        records_refreshed = result.records_refreshed,
        "Period refreshed from payments"
    );
    Ok(Json(ApiResponse::ok(result)))
}
