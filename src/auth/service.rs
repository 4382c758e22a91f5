use uuid::Uuid;

use super::jwt::{verify_token, Claims, JwtError};
use crate::error::ApiError;
use crate::members::{Member, MemberService};

/// Verifies access tokens and loads the caller's profile
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
    members: MemberService,
}

impl AuthService {
    pub fn new(jwt_secret: String, members: MemberService) -> Self {
        Self {
            jwt_secret,
            members,
        }
    }

    /// Check a bearer token and return its claims and subject
    pub fn authenticate(&self, token: &str) -> Result<(Uuid, Claims), ApiError> {
        let claims = verify_token(token, &self.jwt_secret).map_err(|e| match e {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Invalid token".to_string()),
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized("Invalid user ID in token".to_string()))?;
        Ok((user_id, claims))
    }

    /// The caller's profile. The role comes from the database, never the token.
    pub async fn load_member(&self, user_id: Uuid) -> Result<Member, ApiError> {
        let member = self.members.find_member(user_id).await?.ok_or_else(|| {
            ApiError::ProfileRequired("Register a member profile before using the ledger".to_string())
        })?;

        if !member.role.is_active() {
            return Err(ApiError::Forbidden("Member account is inactive".to_string()));
        }

        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_access_token;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> AuthService {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/circle_ledger_unused")
            .unwrap();
        AuthService::new("secret".to_string(), MemberService::new(pool))
    }

    #[tokio::test]
    async fn test_authenticate_returns_subject() {
        let user_id = Uuid::new_v4();
        let token = generate_access_token(user_id, None, "secret", 900).unwrap();
        let (subject, _) = service().authenticate(&token).unwrap();
        assert_eq!(subject, user_id);
    }

    #[tokio::test]
    async fn test_expired_token_message() {
        let token = generate_access_token(Uuid::new_v4(), None, "secret", -3600).unwrap();
        match service().authenticate(&token) {
            Err(ApiError::Unauthorized(message)) => assert_eq!(message, "Token has expired"),
            other => panic!("unexpected: {:?}", other.map(|(id, _)| id)),
        }
    }
}
