//! Router-level checks that never reach the database

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use circle_ledger_server::auth::generate_access_token;
use circle_ledger_server::build_router;
use circle_ledger_server::config::{Config, Environment};
use circle_ledger_server::ledger::DEFAULT_CREDIT_CEILING;
use circle_ledger_server::state::AppState;

const SECRET: &str = "router-test-secret";

fn test_app() -> Router {
    let config = Config {
        database_url: "postgresql://localhost/circle_ledger_unused".to_string(),
        environment: Environment::Development,
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        db_max_connections: 1,
        run_migrations: false,
        cors_allowed_origins: None,
        log_level: "warn".to_string(),
        jwt_secret: SECRET.to_string(),
        default_credit_ceiling: DEFAULT_CREDIT_CEILING,
    };
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database_url)
        .unwrap();

    build_router(AppState::new(pool, &config), None)
}

async fn error_code(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = test_app()
        .oneshot(Request::get("/api/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let response = test_app()
        .oneshot(
            Request::get("/api/months")
                .header(header::AUTHORIZATION, "Bearer not.a.token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized_on_admin_route() {
    let token = generate_access_token(Uuid::new_v4(), None, SECRET, -3600).unwrap();
    let response = test_app()
        .oneshot(
            Request::post("/api/months")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"period_key":"2024-03"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(response).await, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let token = generate_access_token(Uuid::new_v4(), None, "someone-else", 900).unwrap();
    let response = test_app()
        .oneshot(
            Request::post("/api/payments")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let response = test_app()
        .oneshot(
            Request::get("/api/me")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-42"
    );
}

#[tokio::test]
async fn test_request_id_is_generated_when_absent() {
    let response = test_app()
        .oneshot(Request::get("/api/notices").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = test_app()
        .oneshot(Request::get("/api/unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
