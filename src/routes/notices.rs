use axum::{
    routing::{delete, get},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn notice_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notices", get(list_notices).post(create_notice))
        .route("/api/notices/:id", delete(delete_notice))
}
