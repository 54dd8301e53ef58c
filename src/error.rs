//! Error types for the Gatekeeper service.

use thiserror::Error;

use crate::auth::CredentialError;
use crate::ratelimit::StoreError;

/// Main error type for Gatekeeper operations.
///
/// Request-scoped denials (rate limited, unauthenticated, ownership) are not
/// errors; they are returned as values by the admission pipeline and the
/// ownership check.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors
    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    /// Credential signing or verification errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(err: config::ConfigError) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
