//! Bounded retry with exponential backoff for transient store errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Retry policy for counter store I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff before the first retry; doubled for each subsequent one.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (zero-based), with up to 50% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_backoff.saturating_mul(1u32 << attempt.min(16));
        let jitter_ceiling = exp.as_millis() as u64 / 2;
        if jitter_ceiling == 0 {
            return exp;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_ceiling);
        exp + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_transient: fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && is_transient(&err) => {
                    let delay = self.backoff(attempt);
                    debug!(
                        op = label,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
