//! Bearer-token authentication middleware.
//!
//! Public paths pass through without credentials. Every other request needs
//! `Authorization: Bearer <token>`; the token's subject claim becomes the
//! caller identity. With no identity provider configured (dev mode), all
//! requests proceed as `anonymous`.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::routes::AppState;
use crate::config::IdentityConfig;

/// Paths that never require identity.
const PUBLIC_PATHS: &[&str] = &["/", "/health", "/ok", "/info", "/openapi.json", "/docs"];

/// Verified caller identity, attached to the request extensions.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

impl Identity {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The raw bearer token, kept for downstream token exchanges (MCP OAuth).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || path == "/metrics" || path.starts_with("/metrics/")
}

/// Verify a bearer token and return its subject.
fn verify_token(token: &str, identity: &IdentityConfig) -> Result<String, ApiError> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = &identity.issuer {
        validation.set_issuer(&[issuer]);
    }
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(identity.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?;
    Ok(data.claims.sub)
}

/// Extract and verify the caller, then attach [`Identity`] (and the raw
/// [`BearerToken`]) to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    match &state.config.identity {
        None => {
            request
                .extensions_mut()
                .insert(Identity(Identity::ANONYMOUS.to_string()));
        }
        Some(identity_config) => {
            let header = request
                .headers()
                .get(axum::http::header::AUTHORIZATION)
                .ok_or_else(|| {
                    ApiError::Unauthorized("Authorization header missing".to_string())
                })?;
            let header = header
                .to_str()
                .map_err(|_| ApiError::Unauthorized("Malformed Authorization header".to_string()))?;
            let token = header.strip_prefix("Bearer ").ok_or_else(|| {
                ApiError::Unauthorized("Malformed Authorization header".to_string())
            })?;
            let token = token.to_string();

            let user_id = verify_token(&token, identity_config)?;
            tracing::debug!(user_id = %user_id, "authenticated request");
            request.extensions_mut().insert(Identity(user_id));
            request.extensions_mut().insert(BearerToken(token));
        }
    }

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authorization header missing".to_string()))
    }
}

// Handlers take `Option<BearerToken>`: present only when a real token was
// verified (dev mode has no token to forward to MCP servers).
#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerToken>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Authorization header missing".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<String>,
    }

    fn make_token(secret: &str, sub: &str, iss: Option<&str>) -> String {
        let claims = TestClaims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            iss: iss.map(String::from),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn identity_config(issuer: Option<&str>) -> IdentityConfig {
        IdentityConfig {
            jwt_secret: "test-secret-at-least-32-characters!!".to_string(),
            issuer: issuer.map(String::from),
        }
    }

    #[test]
    fn test_verify_valid_token() {
        let config = identity_config(None);
        let token = make_token(&config.jwt_secret, "alice", None);
        assert_eq!(verify_token(&token, &config).unwrap(), "alice");
    }

    #[test]
    fn test_verify_wrong_secret_fails() {
        let config = identity_config(None);
        let token = make_token("some-other-secret-32-characters!!!!!", "alice", None);
        assert!(verify_token(&token, &config).is_err());
    }

    #[test]
    fn test_verify_issuer_mismatch_fails() {
        let config = identity_config(Some("idp.example.com"));
        let token = make_token(&config.jwt_secret, "alice", Some("evil.example.com"));
        assert!(verify_token(&token, &config).is_err());

        let token = make_token(&config.jwt_secret, "alice", Some("idp.example.com"));
        assert_eq!(verify_token(&token, &config).unwrap(), "alice");
    }

    #[test]
    fn test_public_paths() {
        for path in ["/", "/health", "/ok", "/info", "/openapi.json", "/metrics", "/metrics/json", "/docs"] {
            assert!(is_public_path(path), "{path} should be public");
        }
        assert!(!is_public_path("/assistants"));
        assert!(!is_public_path("/threads"));
    }
}
