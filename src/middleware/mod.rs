//! Request extractors and middleware

pub mod auth;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser, Identity};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
