//! Admission outcomes.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthRejection, Caller};
use crate::ratelimit::RateLimitDecision;

/// What the pipeline does when the counter store cannot answer.
///
/// Chosen once at startup and fixed for the life of the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailureMode {
    /// Deny the request with `503 Service Unavailable`.
    #[default]
    FailClosed,
    /// Skip rate limiting for the request and continue to authentication.
    FailOpen,
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Over budget for the current window.
    RateLimited,
    /// Missing or invalid credential on a protected route.
    Unauthenticated(AuthRejection),
    /// Counter store unreachable while failing closed.
    StoreUnavailable,
}

impl DenyReason {
    /// Short machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::RateLimited => "rate_limited",
            DenyReason::Unauthenticated(_) => "unauthenticated",
            DenyReason::StoreUnavailable => "store_unavailable",
        }
    }
}

/// A denied request, with the status an HTTP front end should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: DenyReason,
    /// The limiter's decision, when the denial came from the limiter.
    pub rate_limit: Option<RateLimitDecision>,
}

impl Denial {
    pub fn rate_limited(decision: RateLimitDecision) -> Self {
        Self {
            reason: DenyReason::RateLimited,
            rate_limit: Some(decision),
        }
    }

    pub fn unauthenticated(rejection: AuthRejection) -> Self {
        Self {
            reason: DenyReason::Unauthenticated(rejection),
            rate_limit: None,
        }
    }

    pub fn store_unavailable() -> Self {
        Self {
            reason: DenyReason::StoreUnavailable,
            rate_limit: None,
        }
    }

    /// HTTP status hint for this denial.
    pub fn status(&self) -> StatusCode {
        match self.reason {
            DenyReason::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            DenyReason::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            DenyReason::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Human-readable message for response bodies.
    pub fn message(&self) -> &'static str {
        match &self.reason {
            DenyReason::RateLimited => "Too many requests",
            DenyReason::Unauthenticated(AuthRejection::MissingCredential) => "Missing credential",
            DenyReason::Unauthenticated(AuthRejection::InvalidCredential(_)) => "Invalid credential",
            DenyReason::StoreUnavailable => "Rate limiting temporarily unavailable",
        }
    }
}

/// An admitted request, handed to downstream handlers through request
/// extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub caller: Caller,
    /// The limiter's decision, if the route is rate limited and the store answered.
    pub rate_limit: Option<RateLimitDecision>,
}

/// The pipeline's verdict on one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed(Admitted),
    Denied(Denial),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed(_))
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Admission::Denied(denial) => Some(denial),
            Admission::Allowed(_) => None,
        }
    }
}
