//! Lending circle ledger backend
//!
//! Members, loans and payments of a community lending circle, rolled up into
//! one monthly ledger record per member.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod loan_requests;
pub mod loans;
pub mod members;
pub mod middleware;
pub mod models;
pub mod notices;
pub mod period;
pub mod reports;
pub mod routes;
pub mod settings;
pub mod state;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Assemble every route with the shared middleware stack.
pub fn build_router(state: AppState, cors_allowed_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(routes::member_routes())
        .merge(routes::ledger_routes())
        .merge(routes::loan_routes())
        .merge(routes::loan_request_routes())
        .merge(routes::notice_routes())
        .merge(routes::admin_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(cors_allowed_origins))
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_DISPOSITION])
}
