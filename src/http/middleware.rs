//! Admission as an axum middleware.
//!
//! Wrap the routes of a resource API with [`protect`] and every request runs
//! through the admission pipeline before its handler. Admitted requests carry
//! an [`Admitted`] extension with the caller's identity.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::admission::{Admission, AdmissionPipeline, AdmissionRequest, Admitted};
use super::response::apply_rate_limit_headers;

/// Apply the admission middleware to every route of `router`.
///
/// Uses `route_layer`, so unmatched paths still fall through to the
/// router's 404 without touching the counter store.
pub fn protect<S>(router: Router<S>, pipeline: Arc<AdmissionPipeline>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(pipeline, admission_middleware))
}

/// Run the pipeline for one request.
pub async fn admission_middleware(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let path = parts
        .extensions
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let admission = pipeline
        .admit_path(
            &AdmissionRequest::new(client_ip, &parts.headers),
            &parts.method,
            &path,
        )
        .await;

    match admission {
        Admission::Allowed(admitted) => {
            let decision = admitted.rate_limit;
            parts.extensions.insert::<Admitted>(admitted);
            let mut response = next.run(Request::from_parts(parts, body)).await;
            if let Some(decision) = decision {
                apply_rate_limit_headers(response.headers_mut(), &decision);
            }
            response
        }
        Admission::Denied(denial) => denial.into_response(),
    }
}
