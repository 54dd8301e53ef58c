//! Fixed-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::key::RateLimitKey;
use super::store::{CounterStore, StoreError};

/// Default deadline for one limiter check, covering every store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// The outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request fits in the budget.
    pub allowed: bool,
    /// Requests left in the current window, never negative.
    pub remaining: u64,
    /// The configured limit.
    pub limit: u64,
    /// Post-increment count for this window.
    pub count: u64,
    /// Time until the window resets, if the store reported it.
    pub reset_after: Option<Duration>,
}

impl RateLimitDecision {
    fn from_count(count: u64, limit: u64, reset_after: Option<Duration>) -> Self {
        Self {
            allowed: count <= limit,
            remaining: limit.saturating_sub(count),
            limit,
            count,
            reset_after,
        }
    }
}

/// A fixed-window counter limiter over a shared counter store.
///
/// The limiter keeps no counts of its own. Every check is one atomic
/// increment on the store, plus an expiry write from the caller that opened
/// the window.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    timeout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter with the default deadline.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_timeout(store, DEFAULT_STORE_TIMEOUT)
    }

    /// Create a limiter whose checks fail with `StoreError::Timeout` after `timeout`.
    pub fn with_timeout(store: Arc<dyn CounterStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Count one request against `key` and decide whether it is admitted.
    ///
    /// The increment is not rolled back if the caller stops waiting; an
    /// abandoned request still consumes budget.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        window: Duration,
        limit: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        match tokio::time::timeout(self.timeout, self.check_inner(key, window, limit)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Counter store timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }

    async fn check_inner(
        &self,
        key: &RateLimitKey,
        window: Duration,
        limit: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let increment = self.store.increment(key.as_str()).await?;

        trace!(key = %key, count = increment.count, ttl = ?increment.ttl, "Counter incremented");

        let reset_after = match (increment.count, increment.ttl) {
            (1, _) => {
                self.store.expire_if_unset(key.as_str(), window).await?;
                Some(window)
            }
            (_, Some(ttl)) => Some(ttl),
            (count, None) => {
                // Either the window opener has not set the expiry yet, or it
                // failed to and the key would never reset.
                if self.store.expire_if_unset(key.as_str(), window).await? {
                    warn!(key = %key, count = count, "Orphaned counter had no expiry, re-armed window");
                }
                Some(window)
            }
        };

        let decision = RateLimitDecision::from_count(increment.count, limit, reset_after);

        if !decision.allowed {
            debug!(
                key = %key,
                count = decision.count,
                limit = limit,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::MemoryCounterStore;
    use async_trait::async_trait;
    use futures::future::join_all;

    use super::super::store::Increment;

    fn limiter() -> (RateLimiter, Arc<MemoryCounterStore>) {
        let store = Arc::new(MemoryCounterStore::new());
        (RateLimiter::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_ten_per_minute_scenario() {
        let (limiter, _) = limiter();
        let key = RateLimitKey::fixed("scenario");
        let window = Duration::from_secs(60);

        for expected_remaining in (0..10).rev() {
            let decision = limiter.check(&key, window, 10).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check(&key, window, 10).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.count, 11);
    }

    #[tokio::test]
    async fn test_remaining_stays_within_bounds() {
        let (limiter, _) = limiter();
        let key = RateLimitKey::fixed("bounds");

        for _ in 0..20 {
            let decision = limiter.check(&key, Duration::from_secs(60), 3).await.unwrap();
            assert!(decision.remaining <= decision.limit);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_elapse_starts_new_window() {
        let (limiter, store) = limiter();
        let key = RateLimitKey::fixed("elapse");
        let window = Duration::from_secs(60);

        for _ in 0..3 {
            limiter.check(&key, window, 2).await.unwrap();
        }
        assert!(!limiter.check(&key, window, 2).await.unwrap().allowed);

        tokio::time::advance(window).await;

        let decision = limiter.check(&key, window, 2).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining, 1);
        assert_eq!(store.count("elapse"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_after_reflects_window_progress() {
        let (limiter, _) = limiter();
        let key = RateLimitKey::fixed("reset");
        let window = Duration::from_secs(60);

        let first = limiter.check(&key, window, 5).await.unwrap();
        assert_eq!(first.reset_after, Some(window));

        tokio::time::advance(Duration::from_secs(15)).await;

        let second = limiter.check(&key, window, 5).await.unwrap();
        assert_eq!(second.reset_after, Some(Duration::from_secs(45)));
    }

    #[tokio::test]
    async fn test_separate_keys_have_separate_budgets() {
        let (limiter, _) = limiter();
        let window = Duration::from_secs(60);

        let a = RateLimitKey::fixed("a");
        let b = RateLimitKey::fixed("b");

        assert!(limiter.check(&a, window, 1).await.unwrap().allowed);
        assert!(!limiter.check(&a, window, 1).await.unwrap().allowed);
        assert!(limiter.check(&b, window, 1).await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orphaned_counter_is_rearmed() {
        let (limiter, store) = limiter();
        let window = Duration::from_secs(30);

        // Simulate a window opener that incremented but never set the expiry.
        store.increment("orphan").await.unwrap();

        let key = RateLimitKey::fixed("orphan");
        let decision = limiter.check(&key, window, 10).await.unwrap();
        assert_eq!(decision.count, 2);

        tokio::time::advance(window).await;

        let decision = limiter.check(&key, window, 10).await.unwrap();
        assert_eq!(decision.count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_admit_exactly_limit() {
        let (limiter, _) = limiter();
        let key = RateLimitKey::fixed("race");
        let window = Duration::from_secs(60);

        let checks = (0..50).map(|_| {
            let limiter = limiter.clone();
            let key = key.clone();
            tokio::spawn(async move { limiter.check(&key, window, 20).await.unwrap() })
        });

        let decisions: Vec<RateLimitDecision> = join_all(checks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(decisions.iter().filter(|d| d.allowed).count(), 20);
    }

    struct StalledStore;

    #[async_trait]
    impl CounterStore for StalledStore {
        async fn increment(&self, _key: &str) -> Result<Increment, StoreError> {
            std::future::pending().await
        }

        async fn expire_if_unset(&self, _key: &str, _window: Duration) -> Result<bool, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_times_out() {
        let limiter = RateLimiter::with_timeout(Arc::new(StalledStore), Duration::from_millis(100));
        let err = limiter
            .check(&RateLimitKey::fixed("slow"), Duration::from_secs(60), 10)
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::Timeout(Duration::from_millis(100)));
    }
}
