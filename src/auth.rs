//! Identity gate.
//!
//! Every metadata operation runs on behalf of a verified subject. The gate
//! is an opaque collaborator behind [`IdentityGate`]: handlers hand it the
//! bearer credential and get back a stable subject id, or one of exactly two
//! failures — both of which the HTTP layer folds into a plain 401 so clients
//! cannot distinguish "no credential" from "bad credential" beyond the
//! message the original API already exposed.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

/// Cookie the browser client stores its token under.
const TOKEN_COOKIE: &str = "id_token";

#[derive(Debug, Clone)]
pub struct AuthedUser {
    /// Stable subject identifier; the partition key of everything the
    /// subject owns.
    pub sub: String,
    pub email: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("invalid token")]
    InvalidToken,
}

#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthedUser, AuthError>;
}

/// HS256 token verifier. Expiry is validated; a token without a usable
/// subject claim is rejected.
pub struct Hs256Gate {
    key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

impl Hs256Gate {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityGate for Hs256Gate {
    async fn verify(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(AuthedUser {
            sub: data.claims.sub,
            email: data.claims.email,
        })
    }
}

/// Resolve the calling subject from request headers: `Authorization: Bearer`
/// first, then the `id_token` cookie.
pub async fn require_user(
    headers: &HeaderMap,
    gate: &dyn IdentityGate,
) -> Result<AuthedUser, AuthError> {
    let token = token_from_headers(headers).ok_or(AuthError::Unauthenticated)?;
    gate.verify(&token).await
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').map(str::trim).find_map(|pair| {
        pair.strip_prefix(TOKEN_COOKIE)
            .and_then(|rest| rest.strip_prefix('='))
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims<'a> {
        sub: &'a str,
        email: Option<&'a str>,
        exp: u64,
    }

    fn token(secret: &str, sub: &str) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub,
                email: Some("user@example.com"),
                exp: 4_102_444_800, // 2100-01-01
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn verifies_a_well_formed_token() {
        let gate = Hs256Gate::new("sekrit");
        let user = gate.verify(&token("sekrit", "sub-123")).await.unwrap();
        assert_eq!(user.sub, "sub-123");
        assert_eq!(user.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn rejects_a_token_signed_with_another_key() {
        let gate = Hs256Gate::new("sekrit");
        assert_eq!(
            gate.verify(&token("other", "sub-123")).await.unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[tokio::test]
    async fn missing_credential_is_unauthenticated() {
        let gate = Hs256Gate::new("sekrit");
        let headers = HeaderMap::new();
        assert_eq!(
            require_user(&headers, &gate).await.unwrap_err(),
            AuthError::Unauthenticated
        );
    }

    #[tokio::test]
    async fn reads_bearer_header_and_cookie() {
        let gate = Hs256Gate::new("sekrit");
        let jwt = token("sekrit", "sub-abc");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap(),
        );
        assert_eq!(require_user(&headers, &gate).await.unwrap().sub, "sub-abc");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; id_token={jwt}")).unwrap(),
        );
        assert_eq!(require_user(&headers, &gate).await.unwrap().sub, "sub-abc");
    }
}
