//! Forward-auth service.
//!
//! A reverse proxy asks `GET /auth/check` before forwarding each request,
//! describing the original request in `X-Forwarded-*` headers and passing
//! the caller's cookies through. A `200` admits the request; any other
//! status is returned to the caller as the denial.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::response::apply_rate_limit_headers;
use crate::admission::{Admission, AdmissionPipeline, AdmissionRequest};

pub const X_FORWARDED_METHOD: HeaderName = HeaderName::from_static("x-forwarded-method");
pub const X_FORWARDED_URI: HeaderName = HeaderName::from_static("x-forwarded-uri");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_AUTH_SUBJECT: HeaderName = HeaderName::from_static("x-auth-subject");

/// Routes served by the gatekeeper binary.
pub fn routes(pipeline: Arc<AdmissionPipeline>) -> Router {
    Router::new()
        .route("/auth/check", get(check))
        .route("/healthz", get(healthz))
        .with_state(pipeline)
}

/// The original request, as described by the proxy.
#[derive(Debug, PartialEq, Eq)]
struct ForwardedRequest {
    method: Method,
    path: String,
    client_ip: Option<IpAddr>,
}

impl ForwardedRequest {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let method = headers
            .get(&X_FORWARDED_METHOD)
            .and_then(|v| Method::from_bytes(v.as_bytes()).ok())?;
        let uri = headers.get(&X_FORWARDED_URI)?.to_str().ok()?;
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        if !path.starts_with('/') {
            return None;
        }

        // Right-most entry is the hop our proxy appended; anything to its
        // left came from the client and is not trusted.
        let client_ip = headers
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|v| v.trim().parse().ok());

        Some(Self {
            method,
            path: path.to_string(),
            client_ip,
        })
    }
}

/// Decide whether the proxy should forward a request.
#[instrument(
    skip(pipeline, peer, headers),
    fields(request_id = %Uuid::new_v4())
)]
async fn check(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let Some(forwarded) = ForwardedRequest::from_headers(&headers) else {
        warn!("Forward-auth request without a usable X-Forwarded-Method / X-Forwarded-Uri");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "bad_request",
                "message": "X-Forwarded-Method and X-Forwarded-Uri are required",
            })),
        )
            .into_response();
    };

    let client_ip = forwarded
        .client_ip
        .or(peer.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    debug!(
        method = %forwarded.method,
        path = %forwarded.path,
        client_ip = %client_ip,
        "Processing forward-auth request"
    );

    let admission = pipeline
        .admit_path(
            &AdmissionRequest::new(client_ip, &headers),
            &forwarded.method,
            &forwarded.path,
        )
        .await;

    match admission {
        Admission::Allowed(admitted) => {
            let subject = admitted
                .caller
                .subject_id()
                .map(|id| id.to_string())
                .unwrap_or_default();
            let mut response = StatusCode::OK.into_response();
            if let Ok(value) = HeaderValue::from_str(&subject) {
                response.headers_mut().insert(X_AUTH_SUBJECT, value);
            }
            if let Some(decision) = &admitted.rate_limit {
                apply_rate_limit_headers(response.headers_mut(), decision);
            }
            response
        }
        Admission::Denied(denial) => {
            info!(
                method = %forwarded.method,
                path = %forwarded.path,
                reason = denial.reason.as_str(),
                "Forward-auth request denied"
            );
            denial.into_response()
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
