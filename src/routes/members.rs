//! Profile and member route definitions

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/profile", post(register_profile))
        .route("/api/members", get(list_members).post(create_member))
        .route("/api/members/:id", put(update_member).delete(delete_member))
        .route("/api/members/:id/statement", get(member_statement))
}
