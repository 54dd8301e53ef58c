//! In-memory counter store.
//!
//! Counts live in this process only, so it is suitable for tests and for a
//! single gateway instance. Multi-instance deployments use the Redis store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::store::{CounterStore, Increment, StoreError};

#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    count: u64,
    expires_at: Option<Instant>,
}

impl CounterRecord {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Minimum time between sweeps of expired records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// A counter store backed by a concurrent hash map.
///
/// Each key's record is updated under its shard lock, which gives the same
/// per-key linearizability as `INCR` on a real store. Expired records are
/// treated as absent, recycled on the next increment of the same key, and
/// evicted by a sweep that runs at most once per `SWEEP_INTERVAL`.
#[derive(Debug)]
pub struct MemoryCounterStore {
    records: DashMap<String, CounterRecord>,
    next_sweep: Mutex<Instant>,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_sweep: Mutex::new(Instant::now() + SWEEP_INTERVAL),
        }
    }
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired record, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.records.retain(|_, record| {
            let expired = record.is_expired(now);
            removed += usize::from(expired);
            !expired
        });
        if removed > 0 {
            trace!(removed = removed, "Swept expired counters");
        }
        removed
    }

    fn maybe_sweep(&self, now: Instant) {
        // Another caller already sweeping is good enough.
        let Some(mut next) = self.next_sweep.try_lock() else {
            return;
        };
        if now < *next {
            return;
        }
        *next = now + SWEEP_INTERVAL;
        drop(next);
        self.sweep_expired();
    }

    /// Current count for a key, `None` if absent or expired.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.count)
    }

    /// Number of records held, including expired ones not yet recycled.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<Increment, StoreError> {
        let now = Instant::now();
        // Must run before the entry below takes its shard lock.
        self.maybe_sweep(now);

        let mut record = self.records.entry(key.to_string()).or_insert(CounterRecord {
            count: 0,
            expires_at: None,
        });

        if record.is_expired(now) {
            trace!(key = %key, "Recycling expired counter");
            record.count = 0;
            record.expires_at = None;
        }

        record.count += 1;

        Ok(Increment {
            count: record.count,
            ttl: record.expires_at.map(|at| at.saturating_duration_since(now)),
        })
    }

    async fn expire_if_unset(&self, key: &str, window: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.records.get_mut(key) {
            Some(mut record) if !record.is_expired(now) && record.expires_at.is_none() => {
                record.expires_at = Some(now + window);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
