//! Loan and disbursement handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::loans::{
    CreateLoanRequest, ListLoansQuery, Loan, LoanDetail, LoanService, LoanWithMember,
    PaymentFilter, TopUpRequest,
};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::{ApiResponse, PaginatedResponse};

pub async fn list_loans(
    user: AuthenticatedUser,
    State(loans): State<Arc<LoanService>>,
    Query(mut query): Query<ListLoansQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<LoanWithMember>>>, ApiError> {
    query.member_id = user.scope_member_filter(query.member_id)?;
    let page = loans.list_loans(query).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn create_loan(
    admin: AdminUser,
    State(loans): State<Arc<LoanService>>,
    Json(request): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Loan>>), ApiError> {
    let loan = loans.issue_loan(request, admin.id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

/// Loan with its disbursement and payment history
pub async fn get_loan(
    user: AuthenticatedUser,
    State(loans): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanDetail>>, ApiError> {
    let loan = loans.get_loan(id).await?;
    user.ensure_can_view(loan.member_id)?;

    let disbursements = loans.list_disbursements(id).await?;
    let payments = loans
        .list_payments(&PaymentFilter {
            loan_id: Some(id),
            ..Default::default()
        })
        .await?;

    Ok(Json(ApiResponse::ok(LoanDetail {
        loan,
        disbursements,
        payments,
    })))
}

pub async fn top_up_loan(
    admin: AdminUser,
    State(loans): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = loans.top_up(id, request, admin.id()).await?;
    Ok(Json(ApiResponse::ok(loan)))
}
