//! Loan payment handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::loans::{LoanPayment, LoanService, PaymentFilter, RecordPaymentRequest};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;

pub async fn list_payments(
    user: AuthenticatedUser,
    State(loans): State<Arc<LoanService>>,
    Query(mut filter): Query<PaymentFilter>,
) -> Result<Json<ApiResponse<Vec<LoanPayment>>>, ApiError> {
    filter.member_id = user.scope_member_filter(filter.member_id)?;
    let payments = loans.list_payments(&filter).await?;
    Ok(Json(ApiResponse::ok(payments)))
}

pub async fn record_payment(
    admin: AdminUser,
    State(loans): State<Arc<LoanService>>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanPayment>>), ApiError> {
    let payment = loans.record_payment(request, admin.id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(payment))))
}
