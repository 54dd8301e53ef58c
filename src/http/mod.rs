//! HTTP surfaces: the forward-auth service and the in-process middleware.

mod middleware;
mod response;
mod server;
mod service;

pub use middleware::{admission_middleware, protect};
pub use response::{apply_rate_limit_headers, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
pub use server::{HttpServer, DEFAULT_REQUEST_TIMEOUT};
pub use service::{routes, X_AUTH_SUBJECT, X_FORWARDED_FOR, X_FORWARDED_METHOD, X_FORWARDED_URI};
