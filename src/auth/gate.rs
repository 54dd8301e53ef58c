//! Authentication gate.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use super::claims::AccessClaims;
use super::cookie::CredentialLookup;
use super::verifier::{CredentialError, CredentialVerifier};
use crate::policy::RouteVisibility;

/// Default deadline for one credential verification.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_millis(250);

/// Who is calling, as established by the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Caller {
    /// A verified identity.
    Identity(AccessClaims),
    /// A caller on a public route; no credential was inspected.
    Anonymous,
}

impl Caller {
    pub fn claims(&self) -> Option<&AccessClaims> {
        match self {
            Caller::Identity(claims) => Some(claims),
            Caller::Anonymous => None,
        }
    }

    pub fn subject_id(&self) -> Option<i64> {
        self.claims().map(|c| c.subject_id)
    }
}

/// Why the gate rejected a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No credential on a protected route.
    MissingCredential,
    /// A credential was present but did not verify.
    InvalidCredential(CredentialError),
}

/// Establishes the caller's identity for protected routes.
#[derive(Clone)]
pub struct AuthenticationGate {
    lookup: Arc<dyn CredentialLookup>,
    verifier: Arc<dyn CredentialVerifier>,
    timeout: Duration,
}

impl std::fmt::Debug for AuthenticationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGate")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthenticationGate {
    pub fn new(lookup: Arc<dyn CredentialLookup>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self::with_timeout(lookup, verifier, DEFAULT_VERIFY_TIMEOUT)
    }

    pub fn with_timeout(
        lookup: Arc<dyn CredentialLookup>,
        verifier: Arc<dyn CredentialVerifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            verifier,
            timeout,
        }
    }

    /// Authenticate a request for a route with the given visibility.
    ///
    /// Public routes are admitted before the credential is even looked up.
    pub async fn authenticate(
        &self,
        visibility: RouteVisibility,
        headers: &HeaderMap,
    ) -> Result<Caller, AuthRejection> {
        if visibility == RouteVisibility::Public {
            return Ok(Caller::Anonymous);
        }

        let Some(token) = self.lookup.lookup(headers) else {
            debug!("No credential on protected route");
            return Err(AuthRejection::MissingCredential);
        };

        let verified = match tokio::time::timeout(self.timeout, self.verifier.verify(&token)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Credential verification timed out");
                Err(CredentialError::Timeout)
            }
        };

        match verified {
            Ok(claims) => Ok(Caller::Identity(claims)),
            Err(err) => {
                debug!(error = %err, "Credential rejected");
                Err(AuthRejection::InvalidCredential(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CookieCredential, JwtVerifier, TokenIssuer, DEFAULT_TOKEN_TTL};
    use async_trait::async_trait;
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and delegates to a real verifier.
    struct CountingVerifier {
        inner: JwtVerifier,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialVerifier for CountingVerifier {
        async fn verify(&self, token: &str) -> Result<AccessClaims, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(token).await
        }
    }

    struct HangingVerifier;

    #[async_trait]
    impl CredentialVerifier for HangingVerifier {
        async fn verify(&self, _token: &str) -> Result<AccessClaims, CredentialError> {
            std::future::pending().await
        }
    }

    fn secret() -> SecretString {
        SecretString::new("gate-secret".to_string())
    }

    fn gate() -> (AuthenticationGate, Arc<CountingVerifier>) {
        let verifier = Arc::new(CountingVerifier {
            inner: JwtVerifier::new(&secret()),
            calls: AtomicUsize::new(0),
        });
        let gate = AuthenticationGate::new(Arc::new(CookieCredential::default()), verifier.clone());
        (gate, verifier)
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("access_token={}", token)).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_public_route_skips_verification() {
        let (gate, verifier) = gate();

        let caller = gate
            .authenticate(RouteVisibility::Public, &cookie_headers("garbage"))
            .await
            .unwrap();
        assert_eq!(caller, Caller::Anonymous);

        let caller = gate
            .authenticate(RouteVisibility::Public, &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(caller, Caller::Anonymous);

        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_rejected() {
        let (gate, verifier) = gate();

        let rejection = gate
            .authenticate(RouteVisibility::Protected, &HeaderMap::new())
            .await
            .unwrap_err();

        assert_eq!(rejection, AuthRejection::MissingCredential);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_credential_rejected() {
        let (gate, _) = gate();

        let rejection = gate
            .authenticate(RouteVisibility::Protected, &cookie_headers("garbage"))
            .await
            .unwrap_err();

        assert!(matches!(rejection, AuthRejection::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn test_valid_credential_yields_identity() {
        let (gate, verifier) = gate();
        let token = TokenIssuer::new(&secret(), DEFAULT_TOKEN_TTL)
            .issue(5, "bob")
            .unwrap();

        let caller = gate
            .authenticate(RouteVisibility::Protected, &cookie_headers(&token))
            .await
            .unwrap();

        assert_eq!(caller.subject_id(), Some(5));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_verifier_timeout_is_invalid_credential() {
        let gate = AuthenticationGate::with_timeout(
            Arc::new(CookieCredential::default()),
            Arc::new(HangingVerifier),
            Duration::from_millis(50),
        );

        let rejection = gate
            .authenticate(RouteVisibility::Protected, &cookie_headers("anything"))
            .await
            .unwrap_err();

        assert_eq!(
            rejection,
            AuthRejection::InvalidCredential(CredentialError::Timeout)
        );
    }
}
