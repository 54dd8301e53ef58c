//! Verified identity claims.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// The decoded payload of a verified credential.
///
/// Only a `CredentialVerifier` produces these; everything downstream reads
/// them. They live for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessClaims {
    /// The caller's identity.
    pub subject_id: i64,
    /// When the credential was issued.
    pub issued_at: DateTime<Utc>,
    /// Every other claim the credential carried, uninterpreted.
    pub extra: Map<String, Value>,
}

impl AccessClaims {
    /// Convenience accessor for a string-valued extra claim.
    pub fn extra_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}
