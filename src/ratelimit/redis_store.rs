//! Redis-backed counter store.
//!
//! Counters are plain Redis integers. The increment and the TTL read travel
//! in one `MULTI` block, so the caller learns both the post-increment count
//! and whether the key already has an expiry. Expiries are set with
//! `PEXPIRE ... NX` (Redis 7+), so racing setters cannot overwrite each other.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tracing::info;

use super::retry::RetryPolicy;
use super::store::{CounterStore, Increment, StoreError};

/// A counter store shared by every gateway instance through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    manager: ConnectionManager,
    prefix: String,
    retry: RetryPolicy,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("prefix", &self.prefix)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` if the URL is invalid or the first
    /// connection cannot be established.
    pub async fn connect(url: &str, prefix: &str, retry: RetryPolicy) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| unavailable("redis client", &e))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| unavailable("redis connect", &e))?;

        info!(prefix = %prefix, "Connected to Redis counter store");

        Ok(Self {
            manager,
            prefix: prefix.to_string(),
            retry,
        })
    }

    fn namespaced_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn unavailable(op: &str, err: &RedisError) -> StoreError {
    StoreError::Unavailable(format!("{op}: {err}"))
}

fn is_transient(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout() || err.is_connection_refusal()
}

/// Convert a `PTTL` reply into a remaining lifetime.
///
/// Redis answers `-1` for a key without expiry and `-2` for a missing key.
fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<Increment, StoreError> {
        let key = self.namespaced_key(key);
        let (count, pttl): (u64, i64) = self
            .retry
            .run("incr", is_transient, || {
                let mut conn = self.manager.clone();
                let key = key.clone();
                async move {
                    redis::pipe()
                        .atomic()
                        .cmd("INCR")
                        .arg(&key)
                        .cmd("PTTL")
                        .arg(&key)
                        .query_async(&mut conn)
                        .await
                }
            })
            .await
            .map_err(|e| unavailable("redis incr", &e))?;

        Ok(Increment {
            count,
            ttl: ttl_from_pttl(pttl),
        })
    }

    async fn expire_if_unset(&self, key: &str, window: Duration) -> Result<bool, StoreError> {
        let key = self.namespaced_key(key);
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let applied: i64 = self
            .retry
            .run("pexpire", is_transient, || {
                let mut conn = self.manager.clone();
                let key = key.clone();
                async move {
                    redis::cmd("PEXPIRE")
                        .arg(&key)
                        .arg(window_ms)
                        .arg("NX")
                        .query_async(&mut conn)
                        .await
                }
            })
            .await
            .map_err(|e| unavailable("redis pexpire", &e))?;

        Ok(applied == 1)
    }
}
