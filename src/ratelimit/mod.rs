//! Rate limiting logic over a shared counter store.

mod key;
mod limiter;
mod memory;
mod redis_store;
mod retry;
mod store;

pub use key::RateLimitKey;
pub use limiter::{RateLimitDecision, RateLimiter, DEFAULT_STORE_TIMEOUT};
pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;
pub use retry::RetryPolicy;
pub use store::{CounterStore, Increment, StoreError};
