//! Authentication for the ledger API
//!
//! Sign-in happens at the identity provider. Requests carry its access token;
//! this module verifies the token and resolves the caller's member profile,
//! whose role decides what they may do.

mod jwt;
mod service;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use service::AuthService;
