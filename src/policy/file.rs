//! Route policy declarations loaded from YAML.
//!
//! ```yaml
//! routes:
//!   - method: POST
//!     path: /api/users/login
//!     visibility: public
//!     rate_limit:
//!       limit: 5
//!       window_secs: 60
//!       key: login
//!   - method: GET
//!     path: /api/users
//!     rate_limit: { limit: 10, window_secs: 60 }
//! ```

use std::path::Path;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::registry::{RateLimitPolicy, RouteHandle, RoutePolicy, RouteRegistry, RouteVisibility};
use crate::error::{GatekeeperError, Result};

/// A complete route policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutePolicyFile {
    #[serde(default)]
    pub routes: Vec<RouteDeclaration>,
}

/// Declaration of one route's policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDeclaration {
    /// HTTP method, case-insensitive
    pub method: String,
    /// Path pattern, `:name` segments match any value
    pub path: String,
    /// Defaults to protected when omitted
    #[serde(default)]
    pub visibility: RouteVisibility,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
}

impl RouteDeclaration {
    fn handle(&self) -> Result<RouteHandle> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| GatekeeperError::Config(format!("invalid method {:?}: {}", self.method, e)))?;
        if !self.path.starts_with('/') {
            return Err(GatekeeperError::Config(format!(
                "route path {:?} must start with '/'",
                self.path
            )));
        }
        Ok(RouteHandle::new(method, self.path.clone()))
    }
}

impl RoutePolicyFile {
    /// Parse declarations from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse route policies: {}", e)))
    }

    /// Build a registry from the declarations.
    pub fn into_registry(self) -> Result<RouteRegistry> {
        let mut registry = RouteRegistry::new();
        for declaration in self.routes {
            let handle = declaration.handle()?;
            let policy = RoutePolicy {
                visibility: declaration.visibility,
                rate_limit: declaration.rate_limit,
            };
            registry.register(handle, policy)?;
        }
        Ok(registry)
    }
}

impl RouteRegistry {
    /// Load a registry from a YAML policy file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route policies");

        let contents = std::fs::read_to_string(path)?;
        let registry = Self::from_yaml(&contents)?;

        info!(routes = registry.len(), "Route policies loaded");
        Ok(registry)
    }

    /// Load a registry from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        RoutePolicyFile::from_yaml(yaml)?.into_registry()
    }
}
