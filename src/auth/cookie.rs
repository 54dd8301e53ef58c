//! Credential transport over cookies.

use std::time::Duration;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Finds the raw credential on a request.
pub trait CredentialLookup: Send + Sync {
    fn lookup(&self, headers: &HeaderMap) -> Option<String>;
}

/// Reads the credential from a named cookie.
#[derive(Debug, Clone)]
pub struct CookieCredential {
    name: String,
}

impl CookieCredential {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for CookieCredential {
    fn default() -> Self {
        Self::new(ACCESS_TOKEN_COOKIE)
    }
}

impl CredentialLookup for CookieCredential {
    fn lookup(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.name)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
    }
}

/// Build the session cookie a successful login response sets.
///
/// `max_age` should match the token's lifetime so the browser drops the
/// cookie when the token stops verifying.
pub fn session_cookie(name: &str, token: &str, max_age: Duration) -> Cookie<'static> {
    let max_age = time::Duration::try_from(max_age).unwrap_or(time::Duration::MAX);
    Cookie::build((name.to_string(), token.to_string()))
        .http_only(true)
        .path("/")
        .max_age(max_age)
        .build()
}
