//! Monthly cycle and record route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/api/months", get(list_periods).post(initialize_month))
        .route("/api/months/:period_key/summary", get(period_summary))
        .route("/api/months/:period_key/records", get(list_period_records))
        .route("/api/months/:period_key/refresh", post(refresh_period))
        .route("/api/records/:id", get(get_record).patch(update_record))
        .route("/api/records/:id/finalize", post(finalize_record))
}
