//! Access token authentication.
//!
//! Tokens are HS256 JWTs issued by the account service. They arrive in the
//! `accessToken` cookie or as an `Authorization: Bearer` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Decoded access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User ID
    #[serde(rename = "_id")]
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Expiration
    pub exp: i64,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub username: Option<String>,
}

impl From<AccessClaims> for AuthUser {
    fn from(claims: AccessClaims) -> Self {
        Self {
            id: claims.id,
            username: claims.username,
        }
    }
}

/// Verifies access tokens signed with the shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> ApiResult<Self> {
        if secret.is_empty() {
            return Err(ApiError::internal("access token secret is empty"));
        }
        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    /// Create from `ACCESS_TOKEN_SECRET`.
    pub fn from_env() -> ApiResult<Self> {
        let secret = std::env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| ApiError::internal("ACCESS_TOKEN_SECRET not set"))?;
        Self::new(&secret)
    }

    pub fn verify(&self, token: &str) -> ApiResult<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Invalid access token: {}", e)))?;

        if data.claims.id.is_empty() {
            return Err(ApiError::unauthorized("Invalid access token: missing user id"));
        }
        Ok(data.claims)
    }
}

/// Pull the raw token from the cookie, falling back to the bearer header.
fn token_from_parts(parts: &Parts, jar: &CookieJar) -> Option<String> {
    if let Some(cookie) = jar.get(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = token_from_parts(parts, &jar)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

        let claims = state.auth.verify(&token)?;
        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub(crate) const TEST_SECRET: &str = "test-access-secret";

    pub(crate) fn sign(user_id: &str, expires_in_secs: i64, secret: &str) -> String {
        let claims = AccessClaims {
            id: user_id.to_string(),
            email: Some("user@example.com".to_string()),
            username: Some("user".to_string()),
            exp: chrono::Utc::now().timestamp() + expires_in_secs,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let verifier = JwtVerifier::new(TEST_SECRET).unwrap();
        let claims = verifier.verify(&sign("user-1", 600, TEST_SECRET)).unwrap();
        assert_eq!(claims.id, "user-1");
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(TEST_SECRET).unwrap();
        let err = verifier.verify(&sign("user-1", -600, TEST_SECRET)).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new(TEST_SECRET).unwrap();
        let err = verifier.verify(&sign("user-1", 600, "other")).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_empty_secret_refused() {
        assert!(JwtVerifier::new("").is_err());
    }

    #[test]
    fn test_cookie_preferred_over_header() {
        let request = axum::http::Request::builder()
            .header("cookie", "accessToken=from-cookie")
            .header("authorization", "Bearer from-header")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let jar = CookieJar::from_headers(&parts.headers);
        assert_eq!(token_from_parts(&parts, &jar).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_header_fallback() {
        let request = axum::http::Request::builder()
            .header("authorization", "Bearer abc.def.ghi")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let jar = CookieJar::from_headers(&parts.headers);
        assert_eq!(token_from_parts(&parts, &jar).as_deref(), Some("abc.def.ghi"));

        let request = axum::http::Request::builder()
            .header("authorization", "Basic abc")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        let jar = CookieJar::from_headers(&parts.headers);
        assert_eq!(token_from_parts(&parts, &jar), None);
    }
}
