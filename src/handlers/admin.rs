//! Settings, bulk updates and cash-bill export

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::error::ApiError;
use crate::ledger::{BulkUpdateRequest, BulkUpdateResponse, LedgerService};
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::ApiResponse;
use crate::period::PeriodKey;
use crate::reports::{render_csv, CashBillRequest, ReportService};
use crate::settings::{SettingsService, SystemSettings, UpdateSettingsRequest};

pub async fn get_settings(
    _user: AuthenticatedUser,
    State(settings): State<Arc<SettingsService>>,
) -> Result<Json<ApiResponse<SystemSettings>>, ApiError> {
    let current = settings.get().await?;
    Ok(Json(ApiResponse::ok(current)))
}

pub async fn update_settings(
    admin: AdminUser,
    State(settings): State<Arc<SettingsService>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<SystemSettings>>, ApiError> {
    let updated = settings.update(request, admin.id()).await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// Apply a subscription and/or credit limit to many draft records at once
pub async fn bulk_update_records(
    admin: AdminUser,
    State(ledger): State<Arc<LedgerService>>,
    Json(request): Json<BulkUpdateRequest>,
) -> Result<Json<ApiResponse<BulkUpdateResponse>>, ApiError> {
    let result = ledger.bulk_update(request, admin.id()).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// Cash bills as a CSV download. Defaults to the current month.
pub async fn cash_bill_export(
    admin: AdminUser,
    State(reports): State<Arc<ReportService>>,
    State(settings): State<Arc<SettingsService>>,
    Json(request): Json<CashBillRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let period = request
        .period_key
        .unwrap_or_else(|| PeriodKey::from_date(Utc::now().date_naive()));
    let settings = settings.get().await?;

    let bills = reports
        .cash_bills(period, request.member_ids.as_deref(), &settings)
        .await?;
    let body = render_csv(&bills, settings.cash_bill_interest_bps)?;

    tracing::info!(
        period_key = %period,
        admin_id = %admin.id(),
        bills = bills.len(),
        "Cash-bill export generated"
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"cash-bill-{}.csv\"", period),
            ),
        ],
        body,
    ))
}
