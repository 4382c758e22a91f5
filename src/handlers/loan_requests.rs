//! Loan request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::loan_requests::{
    ApproveLoanRequest, ApprovedLoanRequest, LoanRequest, LoanRequestFilter, LoanRequestService,
    LoanRequestWithMember, RejectLoanRequest, SubmitLoanRequest,
};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;

pub async fn list_loan_requests(
    user: AuthenticatedUser,
    State(requests): State<Arc<LoanRequestService>>,
    Query(mut filter): Query<LoanRequestFilter>,
) -> Result<Json<ApiResponse<Vec<LoanRequestWithMember>>>, ApiError> {
    filter.member_id = user.scope_member_filter(filter.member_id)?;
    let list = requests.list(&filter).await?;
    Ok(Json(ApiResponse::ok(list)))
}

/// Members request loans for themselves
pub async fn submit_loan_request(
    user: AuthenticatedUser,
    State(requests): State<Arc<LoanRequestService>>,
    Json(request): Json<SubmitLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanRequest>>), ApiError> {
    let created = requests.submit(user.user_id(), request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

pub async fn approve_loan_request(
    admin: AdminUser,
    State(requests): State<Arc<LoanRequestService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveLoanRequest>,
) -> Result<Json<ApiResponse<ApprovedLoanRequest>>, ApiError> {
    let approved = requests.approve(id, body, admin.id()).await?;
    Ok(Json(ApiResponse::ok(approved)))
}

pub async fn reject_loan_request(
    admin: AdminUser,
    State(requests): State<Arc<LoanRequestService>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectLoanRequest>,
) -> Result<Json<ApiResponse<LoanRequest>>, ApiError> {
    let rejected = requests.reject(id, body, admin.id()).await?;
    Ok(Json(ApiResponse::ok(rejected)))
}
