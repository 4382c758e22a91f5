//! Authentication extractors
//!
//! Verify the bearer token and resolve the caller's profile.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::ApiError;
use crate::members::Member;

/// Caller with a valid token, whether or not a profile exists yet
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthorized(
                        "Authorization header with Bearer token required".to_string(),
                    )
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);
        let (user_id, claims) = auth_service.authenticate(bearer.token())?;

        Ok(Identity {
            user_id,
            email: claims.email,
        })
    }
}

/// Caller with a valid token and an active member profile
///
/// ```rust,ignore
/// async fn handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, {}", user.member.member_code)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub member: Member,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> Uuid {
        self.member.id
    }

    pub fn is_admin(&self) -> bool {
        self.member.role.is_admin()
    }

    /// Members may only read their own data; admins may read anyone's.
    pub fn ensure_can_view(&self, member_id: Uuid) -> Result<(), ApiError> {
        if self.is_admin() || self.member.id == member_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Members can only view their own records".to_string(),
            ))
        }
    }

    /// Narrow an optional member filter: members always see only themselves.
    pub fn scope_member_filter(&self, requested: Option<Uuid>) -> Result<Option<Uuid>, ApiError> {
        if self.is_admin() {
            return Ok(requested);
        }
        match requested {
            Some(id) if id != self.member.id => Err(ApiError::Forbidden(
                "Members can only view their own records".to_string(),
            )),
            _ => Ok(Some(self.member.id)),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        let auth_service = Arc::<AuthService>::from_ref(state);
        let member = auth_service.load_member(identity.user_id).await?;

        Ok(AuthenticatedUser { member })
    }
}

/// Extractor that additionally requires the admin role
pub struct AdminUser(pub AuthenticatedUser);

impl AdminUser {
    pub fn id(&self) -> Uuid {
        self.0.user_id()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }

        Ok(AdminUser(user))
    }
}
