//! Profile and member administration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ledger::LedgerService;
use crate::loans::{LoanService, PaymentFilter};
use crate::members::{
    CreateMemberRequest, Member, MemberFilter, MemberService, MemberStatement,
    RegisterProfileRequest, StatementQuery, UpdateMemberRequest,
};
use crate::middleware::{AdminUser, AuthenticatedUser, Identity};
use crate::models::{ApiResponse, PaginatedResponse};
use crate::settings::SettingsService;

/// Caller's own profile
pub async fn get_me(user: AuthenticatedUser) -> Json<ApiResponse<Member>> {
    Json(ApiResponse::ok(user.member))
}

/// First login: create the caller's profile with the `member` role
pub async fn register_profile(
    identity: Identity,
    State(members): State<Arc<MemberService>>,
    State(settings): State<Arc<SettingsService>>,
    Json(mut request): Json<RegisterProfileRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Member>>), ApiError> {
    if request.email.is_none() {
        request.email = identity.email;
    }
    let defaults = settings.get().await?;
    let member = members
        .register_profile(
            identity.user_id,
            request,
            defaults.default_monthly_subscription,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(member))))
}

pub async fn list_members(
    _admin: AdminUser,
    State(members): State<Arc<MemberService>>,
    Query(filter): Query<MemberFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<Member>>>, ApiError> {
    let page = members.list_members(filter).await?;
    Ok(Json(ApiResponse::ok(page)))
}

pub async fn create_member(
    _admin: AdminUser,
    State(members): State<Arc<MemberService>>,
    State(settings): State<Arc<SettingsService>>,
    Json(request): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Member>>), ApiError> {
    let defaults = settings.get().await?;
    let member = members
        .create_member(request, defaults.default_monthly_subscription)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(member))))
}

pub async fn update_member(
    _admin: AdminUser,
    State(members): State<Arc<MemberService>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateMemberRequest>,
) -> Result<Json<ApiResponse<Member>>, ApiError> {
    let member = members.update_member(id, request).await?;
    Ok(Json(ApiResponse::ok(member)))
}

pub async fn delete_member(
    admin: AdminUser,
    State(members): State<Arc<MemberService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.id() == id {
        return Err(ApiError::BadRequest(
            "Admins cannot delete their own profile".to_string(),
        ));
    }
    members.delete_member(id).await?;
    tracing::info!(member_id = %id, admin_id = %admin.id(), "Member deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Ledger line, payments and open loans of one member for a period
pub async fn member_statement(
    user: AuthenticatedUser,
    State(members): State<Arc<MemberService>>,
    State(ledger): State<Arc<LedgerService>>,
    State(loans): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatementQuery>,
) -> Result<Json<ApiResponse<MemberStatement>>, ApiError> {
    user.ensure_can_view(id)?;

    let member = members.get_member(id).await?;
    let record = ledger.find_member_record(id, query.period_key).await?;
    let payments = loans
        .list_payments(&PaymentFilter {
            member_id: Some(id),
            period_key: Some(query.period_key),
            ..Default::default()
        })
        .await?;
    let open_loans = loans.open_loans_for(id).await?;

    Ok(Json(ApiResponse::ok(MemberStatement {
        member,
        period_key: query.period_key,
        record,
        payments,
        open_loans,
    })))
}
