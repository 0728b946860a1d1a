//! Authentication and authorization.
//!
//! Token issuance is delegated to an external auth provider; this module
//! only verifies bearer JWTs and enforces the three-tier role contract
//! (ADMIN > MANAGER > CASHIER) through [`policy::allows`].

use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

pub mod policy;

pub use policy::{allows, Action, Role};

/// Claims carried by tokens from the auth provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id
    pub sub: String,
    pub name: Option<String>,
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated identity extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub role: Role,
}

impl AuthUser {
    /// Fails with `Forbidden` unless the user's role covers `action`.
    pub fn require(&self, action: Action) -> Result<(), ServiceError> {
        if policy::allows(self.role, action) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} may not perform this operation",
                self.role
            )))
        }
    }
}

/// Verifies a bearer token and maps its claims to an [`AuthUser`].
pub fn verify_token(token: &str, secret: &str, issuer: &str) -> Result<AuthUser, ServiceError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[issuer]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ServiceError::Unauthorized(format!("Invalid token: {e}")))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::Unauthorized("Token subject is not a user id".to_string()))?;
    let role = Role::parse(&data.claims.role)?;

    Ok(AuthUser {
        user_id,
        name: data.claims.name,
        role,
    })
}

/// Signs a token for the given identity. Production tokens come from the
/// external auth provider; this exists for tests and local tooling.
pub fn issue_token(
    user_id: Uuid,
    name: &str,
    role: Role,
    secret: &str,
    issuer: &str,
    ttl_secs: i64,
) -> Result<String, ServiceError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        name: Some(name.to_string()),
        role: role.to_string(),
        iss: issuer.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("Missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("Expected a bearer token".into()))?;

        verify_token(token, &state.config.jwt_secret, &state.config.jwt_issuer)
    }
}
