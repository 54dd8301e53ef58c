//! Rate limit key generation.

use std::fmt;
use std::net::IpAddr;

use crate::policy::RateLimitPolicy;

/// A key that identifies one rate limit counter.
///
/// Either the fixed key declared on the route, or a key derived from the
/// caller's address and the route path, so that each caller gets its own
/// budget per route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Key derived from the caller address and the route path pattern.
    pub fn derived(client_ip: IpAddr, route_path: &str) -> Self {
        Self(format!("rate:limit:{}:{}", client_ip, route_path))
    }

    /// A fixed key shared by every caller of the routes that declare it.
    pub fn fixed(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The effective key for a request under `policy`.
    pub fn for_request(policy: &RateLimitPolicy, client_ip: IpAddr, route_path: &str) -> Self {
        match policy.key.as_deref() {
            Some(key) => Self::fixed(key),
            None => Self::derived(client_ip, route_path),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
