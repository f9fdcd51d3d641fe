//! Staff token verification.
//!
//! Tokens are HS256 JWTs issued by the back office; this server only checks
//! them. A token is good for one organization and one role.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tableside_core::StaffRole;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Staff member id
    pub sub: String,

    /// Organization the token is valid for
    pub org_id: String,

    pub role: StaffRole,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verifies staff tokens against the shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 0;
        JwtVerifier {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Staff token rejected");
                ApiError::unauthorized("Invalid or expired token")
            })
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

/// Extract token from Authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A caller that presented a valid staff token.
#[derive(Debug, Clone)]
pub struct Staff(pub Claims);

impl Staff {
    pub fn role(&self) -> StaffRole {
        self.0.role
    }

    /// Checks the token belongs to `organization_id` and, when `allowed` is
    /// not empty, carries one of those roles.
    pub fn authorize(&self, organization_id: &str, allowed: &[StaffRole]) -> Result<(), ApiError> {
        if self.0.org_id != organization_id {
            warn!(staff = %self.0.sub, token_org = %self.0.org_id, organization_id, "Token used for another organization");
            return Err(ApiError::unauthorized("Token is not valid for this organization"));
        }
        if !allowed.is_empty() && !allowed.contains(&self.0.role) {
            warn!(staff = %self.0.sub, role = %self.0.role, "Role not allowed");
            return Err(ApiError::unauthorized(format!(
                "Role {} may not do this",
                self.0.role
            )));
        }
        Ok(())
    }
}

impl FromRequestParts<AppState> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing staff token"))?;
        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::unauthorized("Malformed Authorization header"))?;

        Ok(Staff(state.jwt.verify(token)?))
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    pub const SECRET: &str = "test-secret";

    pub fn token(org: &str, role: StaffRole) -> String {
        token_expiring(org, role, Utc::now() + Duration::minutes(10))
    }

    pub fn token_expiring(org: &str, role: StaffRole, exp: chrono::DateTime<Utc>) -> String {
        let claims = Claims {
            sub: format!("staff-{role}"),
            org_id: org.to_string(),
            role,
            exp: exp.timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }
}
