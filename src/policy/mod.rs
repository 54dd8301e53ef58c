//! Route admission policies: visibility and rate limits, declared once at startup.

mod file;
mod registry;

pub use file::{RouteDeclaration, RoutePolicyFile};
pub use registry::{
    RateLimitPolicy, ResolvedRoute, RouteHandle, RoutePolicy, RouteRegistry, RouteVisibility,
};
