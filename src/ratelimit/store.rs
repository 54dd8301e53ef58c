//! Counter store trait for abstracting the shared counting backend.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a counter store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the request deadline.
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

/// The result of an atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Post-increment count for the key.
    pub count: u64,
    /// Remaining time-to-live of the key, `None` if the key has no expiry.
    pub ttl: Option<Duration>,
}

/// A key-value store with atomic increment and expiry.
///
/// Implementations must linearize increments per key: concurrent callers
/// on the same key each observe a distinct post-increment count. Gates in
/// any number of processes may share one store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment the counter for `key`, creating it at zero first
    /// if it does not exist or has expired.
    async fn increment(&self, key: &str) -> Result<Increment, StoreError>;

    /// Set the expiry of `key` to `window` from now, only if the key exists
    /// and has no expiry yet.
    ///
    /// Returns `true` if this call set the expiry.
    async fn expire_if_unset(&self, key: &str, window: Duration) -> Result<bool, StoreError>;
}
