//! Credential verifier trait.

use async_trait::async_trait;
use thiserror::Error;

use super::claims::AccessClaims;

/// Errors from verifying or issuing credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The credential's lifetime has passed.
    #[error("credential expired")]
    Expired,

    /// Malformed, wrongly signed or missing required claims.
    #[error("invalid credential: {0}")]
    Invalid(String),

    /// The verifier did not answer within the deadline.
    #[error("credential verification timed out")]
    Timeout,

    /// A credential could not be signed.
    #[error("failed to sign credential: {0}")]
    Signing(String),
}

/// Validates a signed identity token and extracts its claims.
///
/// Verification may be remote, so it is async and runs under the gate's
/// deadline.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AccessClaims, CredentialError>;
}
