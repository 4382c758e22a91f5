//! Loan request route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_request_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/loan-requests",
            get(list_loan_requests).post(submit_loan_request),
        )
        .route("/api/loan-requests/:id/approve", post(approve_loan_request))
        .route("/api/loan-requests/:id/reject", post(reject_loan_request))
}
