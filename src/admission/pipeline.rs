//! The admission pipeline: rate limiting, then authentication.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use tracing::{debug, error, warn};

use super::decision::{Admission, Admitted, Denial, StoreFailureMode};
use crate::auth::AuthenticationGate;
use crate::policy::{RouteHandle, RoutePolicy, RouteRegistry};
use crate::ratelimit::{RateLimitDecision, RateLimitKey, RateLimiter};

/// The parts of an incoming request the pipeline looks at.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    /// Caller network address, used to derive per-caller rate limit keys.
    pub client_ip: IpAddr,
    /// Request headers, where the credential travels.
    pub headers: &'a HeaderMap,
}

impl<'a> AdmissionRequest<'a> {
    pub fn new(client_ip: IpAddr, headers: &'a HeaderMap) -> Self {
        Self { client_ip, headers }
    }
}

/// Composes the rate limiter and the authentication gate into one decision.
///
/// Stages always run in the same order and the first denial ends
/// evaluation:
///
/// 1. resolve the route policy,
/// 2. rate limit (only if the route declares a limit),
/// 3. authenticate (public routes pass without a credential).
///
/// Callers over budget are turned away before any credential is verified.
#[derive(Debug)]
pub struct AdmissionPipeline {
    registry: Arc<RouteRegistry>,
    limiter: RateLimiter,
    gate: AuthenticationGate,
    failure_mode: StoreFailureMode,
}

impl AdmissionPipeline {
    pub fn new(
        registry: Arc<RouteRegistry>,
        limiter: RateLimiter,
        gate: AuthenticationGate,
        failure_mode: StoreFailureMode,
    ) -> Self {
        Self {
            registry,
            limiter,
            gate,
            failure_mode,
        }
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub fn failure_mode(&self) -> StoreFailureMode {
        self.failure_mode
    }

    /// Admit a request to a registered route handle.
    pub async fn admit(&self, request: &AdmissionRequest<'_>, route: &RouteHandle) -> Admission {
        let policy = self.registry.resolve(route);
        self.evaluate(request, route.path(), policy).await
    }

    /// Admit a request given its concrete method and path, matching the path
    /// against the registered patterns.
    pub async fn admit_path(
        &self,
        request: &AdmissionRequest<'_>,
        method: &Method,
        path: &str,
    ) -> Admission {
        let resolved = self.registry.match_route(method, path);
        self.evaluate(request, resolved.path, resolved.policy).await
    }

    async fn evaluate(
        &self,
        request: &AdmissionRequest<'_>,
        route_path: &str,
        policy: &RoutePolicy,
    ) -> Admission {
        let rate_limit = match self.rate_limit_stage(request, route_path, policy).await {
            Ok(decision) => decision,
            Err(denial) => return Admission::Denied(denial),
        };

        match self.gate.authenticate(policy.visibility, request.headers).await {
            Ok(caller) => {
                debug!(
                    route = %route_path,
                    subject_id = ?caller.subject_id(),
                    "Request admitted"
                );
                Admission::Allowed(Admitted { caller, rate_limit })
            }
            Err(rejection) => {
                debug!(route = %route_path, rejection = ?rejection, "Request unauthenticated");
                Admission::Denied(Denial::unauthenticated(rejection))
            }
        }
    }

    async fn rate_limit_stage(
        &self,
        request: &AdmissionRequest<'_>,
        route_path: &str,
        policy: &RoutePolicy,
    ) -> Result<Option<RateLimitDecision>, Denial> {
        let Some(rate_limit) = &policy.rate_limit else {
            return Ok(None);
        };

        let key = RateLimitKey::for_request(rate_limit, request.client_ip, route_path);

        match self
            .limiter
            .check(&key, rate_limit.window(), rate_limit.limit)
            .await
        {
            Ok(decision) if decision.allowed => Ok(Some(decision)),
            Ok(decision) => {
                debug!(
                    route = %route_path,
                    key = %key,
                    count = decision.count,
                    limit = decision.limit,
                    "Request rate limited"
                );
                Err(Denial::rate_limited(decision))
            }
            Err(err) => match self.failure_mode {
                StoreFailureMode::FailClosed => {
                    error!(
                        route = %route_path,
                        key = %key,
                        error = %err,
                        "Counter store unavailable, denying request"
                    );
                    Err(Denial::store_unavailable())
                }
                StoreFailureMode::FailOpen => {
                    warn!(
                        route = %route_path,
                        key = %key,
                        error = %err,
                        "Counter store unavailable, skipping rate limit"
                    );
                    Ok(None)
                }
            },
        }
    }
}
