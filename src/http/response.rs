//! HTTP responses for denials and rate limit headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::admission::Denial;
use crate::ownership::OwnershipError;
use crate::ratelimit::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Add the limiter's view of the budget to a response.
///
/// `Retry-After` is only set on denials, rounded up to whole seconds.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));

    if !decision.allowed {
        if let Some(reset_after) = decision.reset_after {
            let secs = reset_after.as_secs() + u64::from(reset_after.subsec_nanos() > 0);
            headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.reason.as_str(),
            "message": self.message(),
        }));
        let mut response = (self.status(), body).into_response();
        if let Some(decision) = &self.rate_limit {
            apply_rate_limit_headers(response.headers_mut(), decision);
        }
        response
    }
}

impl IntoResponse for OwnershipError {
    fn into_response(self) -> Response {
        let error = match &self {
            OwnershipError::ResourceNotFound { .. } => "not_found",
            OwnershipError::Unauthorized { .. } => "forbidden",
            OwnershipError::Lookup(_) => "internal",
        };
        // Lookup failures stay opaque to callers.
        let message = match &self {
            OwnershipError::Lookup(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": error, "message": message }))).into_response()
    }
}
