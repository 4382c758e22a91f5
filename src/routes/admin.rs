//! Settings and admin tooling route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/settings", get(get_settings))
        .route("/api/admin/settings", put(update_settings))
        .route("/api/admin/bulk-update-settings", post(bulk_update_records))
        .route("/api/admin/cash-bill-excel", post(cash_bill_export))
}
