//! HMAC-signed JWT credentials.
//!
//! Tokens carry `{id, iat, exp}` plus any extra claims (the login flow adds
//! `username`). Only HS256 is accepted.

use std::time::Duration;

use async_trait::async_trait;
use axum_extra::extract::cookie::Cookie;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::claims::AccessClaims;
use super::cookie::session_cookie;
use super::verifier::{CredentialError, CredentialVerifier};

/// Lifetime of tokens issued by the login flow.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    id: i64,
    iat: i64,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Verifies HS256 tokens signed with the process-wide secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<AccessClaims, CredentialError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "JWT verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => CredentialError::Expired,
                    _ => CredentialError::Invalid(e.to_string()),
                }
            })?;

        let claims = data.claims;
        let issued_at = DateTime::<Utc>::from_timestamp(claims.iat, 0)
            .ok_or_else(|| CredentialError::Invalid("iat out of range".to_string()))?;

        Ok(AccessClaims {
            subject_id: claims.id,
            issued_at,
            extra: claims.extra,
        })
    }
}

/// Signs credentials for the login flow.
pub struct TokenIssuer {
    key: EncodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            ttl,
        }
    }

    /// Issue a token for a logged-in user.
    pub fn issue(&self, subject_id: i64, username: &str) -> Result<String, CredentialError> {
        let mut extra = Map::new();
        extra.insert("username".to_string(), Value::String(username.to_string()));
        self.issue_with_claims(subject_id, extra)
    }

    /// Issue a token carrying arbitrary extra claims.
    pub fn issue_with_claims(
        &self,
        subject_id: i64,
        extra: Map<String, Value>,
    ) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            id: subject_id,
            iat: now,
            exp: now.saturating_add(ttl),
            extra,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    /// Issue a token and wrap it in a session cookie that lives as long
    /// as the token does.
    pub fn issue_cookie(
        &self,
        cookie_name: &str,
        subject_id: i64,
        username: &str,
    ) -> Result<Cookie<'static>, CredentialError> {
        let token = self.issue(subject_id, username)?;
        Ok(session_cookie(cookie_name, &token, self.ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
