//! Route policy registry.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatekeeperError, Result};

/// Whether a route requires a verified credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteVisibility {
    /// Admitted without looking at any credential.
    Public,
    /// Requires a valid credential.
    #[default]
    Protected,
}

/// Rate limit parameters attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Requests allowed per window
    pub limit: u64,
    /// Window length in seconds
    pub window_secs: u64,
    /// Fixed counter key; when absent the key is derived per caller and route
    #[serde(default)]
    pub key: Option<String>,
}

impl RateLimitPolicy {
    /// Create a policy, rejecting a zero limit or window.
    pub fn new(limit: u64, window_secs: u64) -> Result<Self> {
        let policy = Self {
            limit,
            window_secs,
            key: None,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Share one counter between every route and caller using `key`.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(GatekeeperError::Config(
                "rate limit must be greater than 0".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(GatekeeperError::Config(
                "rate limit window must be greater than 0 seconds".to_string(),
            ));
        }
        if matches!(self.key.as_deref(), Some("")) {
            return Err(GatekeeperError::Config(
                "fixed rate limit key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Policy attached to a single route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub visibility: RouteVisibility,
    /// `None` means unlimited: the limiter is never consulted.
    pub rate_limit: Option<RateLimitPolicy>,
}

impl RoutePolicy {
    pub fn public() -> Self {
        Self {
            visibility: RouteVisibility::Public,
            rate_limit: None,
        }
    }

    pub fn protected() -> Self {
        Self::default()
    }

    pub fn rate_limited(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }
}

/// Policy for any route nobody registered: protected and unlimited.
static DEFAULT_POLICY: RoutePolicy = RoutePolicy {
    visibility: RouteVisibility::Protected,
    rate_limit: None,
};

/// Identifies a route by method and path pattern.
///
/// Path patterns use `:name` for a segment that matches any single value,
/// e.g. `/api/expense/:userId/:expenseId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteHandle {
    method: Method,
    path: String,
}

impl RouteHandle {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of literal segments if the pattern matches `path`.
    fn match_score(&self, path: &str) -> Option<usize> {
        let pattern: Vec<&str> = segments(&self.path).collect();
        let concrete: Vec<&str> = segments(path).collect();
        if pattern.len() != concrete.len() {
            return None;
        }

        let mut literals = 0;
        for (expected, actual) in pattern.iter().zip(&concrete) {
            if expected.starts_with(':') {
                if actual.is_empty() {
                    return None;
                }
            } else if expected == actual {
                literals += 1;
            } else {
                return None;
            }
        }
        Some(literals)
    }
}

impl fmt::Display for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

/// A route matched against the registry.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRoute<'a> {
    /// The route path used to derive per-caller keys: the registered pattern
    /// when one matched, otherwise the requested path.
    pub path: &'a str,
    pub policy: &'a RoutePolicy,
}

/// Mapping from routes to their admission policy.
///
/// Built once at startup and shared behind an `Arc`; there is no way to
/// change a route's policy after registration.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<(RouteHandle, RoutePolicy)>,
    index: HashMap<RouteHandle, usize>,
}

impl RouteRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route's policy.
    ///
    /// # Errors
    /// Fails if the route was already registered or its rate limit is invalid.
    pub fn register(&mut self, handle: RouteHandle, policy: RoutePolicy) -> Result<()> {
        if let Some(rate_limit) = &policy.rate_limit {
            rate_limit
                .validate()
                .map_err(|e| GatekeeperError::Config(format!("route {}: {}", handle, e)))?;
        }
        if self.index.contains_key(&handle) {
            return Err(GatekeeperError::Config(format!(
                "route {} registered twice",
                handle
            )));
        }

        debug!(
            route = %handle,
            visibility = ?policy.visibility,
            rate_limit = ?policy.rate_limit,
            "Registered route policy"
        );

        self.index.insert(handle.clone(), self.routes.len());
        self.routes.push((handle, policy));
        Ok(())
    }

    /// Builder-style registration for route setup code.
    pub fn route(mut self, method: Method, path: &str, policy: RoutePolicy) -> Result<Self> {
        self.register(RouteHandle::new(method, path), policy)?;
        Ok(self)
    }

    /// Policy for a registered route handle, or the default policy.
    ///
    /// `HEAD` without its own registration resolves to the `GET` route, since
    /// the router serves it with the `GET` handler.
    pub fn resolve(&self, handle: &RouteHandle) -> &RoutePolicy {
        self.index
            .get(handle)
            .or_else(|| {
                (handle.method == Method::HEAD)
                    .then(|| self.index.get(&RouteHandle::new(Method::GET, handle.path.clone())))
                    .flatten()
            })
            .map(|&i| &self.routes[i].1)
            .unwrap_or(&DEFAULT_POLICY)
    }

    /// Match a concrete request path against the registered patterns.
    ///
    /// An exact registration wins; otherwise the pattern with the most
    /// literal segments, then the earliest registered. `HEAD` falls back to
    /// the `GET` routes when no `HEAD` route matches.
    pub fn match_route<'a>(&'a self, method: &Method, path: &'a str) -> ResolvedRoute<'a> {
        let found = self.find(method, path).or_else(|| {
            (*method == Method::HEAD)
                .then(|| self.find(&Method::GET, path))
                .flatten()
        });

        match found {
            Some((handle, policy)) => ResolvedRoute {
                path: handle.path(),
                policy,
            },
            None => ResolvedRoute {
                path,
                policy: &DEFAULT_POLICY,
            },
        }
    }

    fn find(&self, method: &Method, path: &str) -> Option<(&RouteHandle, &RoutePolicy)> {
        if let Some(&i) = self.index.get(&RouteHandle::new(method.clone(), path)) {
            let (handle, policy) = &self.routes[i];
            return Some((handle, policy));
        }

        let mut best: Option<(usize, &(RouteHandle, RoutePolicy))> = None;
        for entry in self.routes.iter().filter(|(h, _)| h.method() == method) {
            if let Some(score) = entry.0.match_score(path) {
                if best.map_or(true, |(top, _)| score > top) {
                    best = Some((score, entry));
                }
            }
        }
        best.map(|(_, (handle, policy))| (handle, policy))
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_route_defaults_to_protected_unlimited() {
        let registry = RouteRegistry::new();
        let policy = registry.resolve(&RouteHandle::new(Method::GET, "/anything"));

        assert_eq!(policy.visibility, RouteVisibility::Protected);
        assert!(policy.rate_limit.is_none());
    }

    #[test]
    fn test_resolve_registered_route() {
        let registry = RouteRegistry::new()
            .route(
                Method::GET,
                "/api/users",
                RoutePolicy::protected().rate_limited(RateLimitPolicy::new(10, 60).unwrap()),
            )
            .unwrap()
            .route(Method::POST, "/api/users", RoutePolicy::public())
            .unwrap();

        let get = registry.resolve(&RouteHandle::new(Method::GET, "/api/users"));
        assert_eq!(get.rate_limit.as_ref().unwrap().limit, 10);
        assert_eq!(get.rate_limit.as_ref().unwrap().window(), Duration::from_secs(60));

        let post = registry.resolve(&RouteHandle::new(Method::POST, "/api/users"));
        assert_eq!(post.visibility, RouteVisibility::Public);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = RouteRegistry::new();
        let handle = RouteHandle::new(Method::GET, "/api/users");

        registry.register(handle.clone(), RoutePolicy::public()).unwrap();
        assert!(registry.register(handle, RoutePolicy::protected()).is_err());
    }

    #[test]
    fn test_invalid_rate_limit_rejected() {
        assert!(RateLimitPolicy::new(0, 60).is_err());
        assert!(RateLimitPolicy::new(10, 0).is_err());

        let mut registry = RouteRegistry::new();
        let policy = RoutePolicy::protected().rate_limited(RateLimitPolicy {
            limit: 5,
            window_secs: 60,
            key: Some(String::new()),
        });
        assert!(registry
            .register(RouteHandle::new(Method::GET, "/x"), policy)
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_match_route_with_parameters() {
        let registry = RouteRegistry::new()
            .route(Method::PATCH, "/api/expense/:userId/:expenseId", RoutePolicy::protected())
            .unwrap()
            .route(
                Method::PATCH,
                "/api/expense/:userId/:categoryId/:expenseId",
                RoutePolicy::protected().rate_limited(RateLimitPolicy::new(3, 10).unwrap()),
            )
            .unwrap();

        let two = registry.match_route(&Method::PATCH, "/api/expense/5/9");
        assert_eq!(two.path, "/api/expense/:userId/:expenseId");
        assert!(two.policy.rate_limit.is_none());

        let three = registry.match_route(&Method::PATCH, "/api/expense/5/2/9/");
        assert_eq!(three.path, "/api/expense/:userId/:categoryId/:expenseId");
        assert!(three.policy.rate_limit.is_some());

        let wrong_method = registry.match_route(&Method::DELETE, "/api/expense/5/9");
        assert_eq!(wrong_method.path, "/api/expense/5/9");
        assert_eq!(wrong_method.policy, &RoutePolicy::protected());
    }

    #[test]
    fn test_literal_segments_win_over_parameters() {
        let registry = RouteRegistry::new()
            .route(Method::POST, "/api/users/:id", RoutePolicy::protected())
            .unwrap()
            .route(Method::POST, "/api/users/login", RoutePolicy::public())
            .unwrap();

        let login = registry.match_route(&Method::POST, "/api/users/login");
        assert_eq!(login.policy.visibility, RouteVisibility::Public);

        let other = registry.match_route(&Method::POST, "/api/users/42");
        assert_eq!(other.path, "/api/users/:id");
        assert_eq!(other.policy.visibility, RouteVisibility::Protected);
    }

    #[test]
    fn test_head_resolves_to_get_route() {
        let registry = RouteRegistry::new()
            .route(
                Method::GET,
                "/api/users",
                RoutePolicy::protected().rate_limited(RateLimitPolicy::new(2, 60).unwrap()),
            )
            .unwrap()
            .route(Method::GET, "/api/categories/:userId", RoutePolicy::public())
            .unwrap()
            .route(Method::HEAD, "/api/status", RoutePolicy::public())
            .unwrap()
            .route(Method::GET, "/api/status", RoutePolicy::protected())
            .unwrap();

        let head = registry.match_route(&Method::HEAD, "/api/users");
        assert_eq!(head.path, "/api/users");
        assert_eq!(head.policy.rate_limit, Some(RateLimitPolicy::new(2, 60).unwrap()));

        let pattern = registry.match_route(&Method::HEAD, "/api/categories/5");
        assert_eq!(pattern.path, "/api/categories/:userId");
        assert_eq!(pattern.policy.visibility, RouteVisibility::Public);

        let resolved = registry.resolve(&RouteHandle::new(Method::HEAD, "/api/users"));
        assert!(resolved.rate_limit.is_some());

        // An explicit HEAD registration wins over the GET route.
        let own = registry.match_route(&Method::HEAD, "/api/status");
        assert_eq!(own.policy.visibility, RouteVisibility::Public);

        // Other methods never borrow the GET policy.
        let post = registry.match_route(&Method::POST, "/api/users");
        assert!(post.policy.rate_limit.is_none());
    }
}
