//! Notice board handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;
use crate::notices::{CreateNoticeRequest, Notice, NoticeFilter, NoticeService};

/// Active notices; only admins may ask for expired ones too
pub async fn list_notices(
    user: AuthenticatedUser,
    State(notices): State<Arc<NoticeService>>,
    Query(mut filter): Query<NoticeFilter>,
) -> Result<Json<ApiResponse<Vec<Notice>>>, ApiError> {
    filter.include_expired &= user.is_admin();
    let list = notices.list(&filter).await?;
    Ok(Json(ApiResponse::ok(list)))
}

pub async fn create_notice(
    admin: AdminUser,
    State(notices): State<Arc<NoticeService>>,
    Json(request): Json<CreateNoticeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Notice>>), ApiError> {
    let notice = notices.create(request, admin.id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(notice))))
}

pub async fn delete_notice(
    _admin: AdminUser,
    State(notices): State<Arc<NoticeService>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    notices.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
