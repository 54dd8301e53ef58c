//! HTTP server for the forward-auth service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::service::routes;
use crate::admission::AdmissionPipeline;
use crate::error::{GatekeeperError, Result};

/// Default deadline for a whole forward-auth request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP server exposing the admission pipeline.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The admission pipeline shared by every request
    pipeline: Arc<AdmissionPipeline>,
    /// Deadline for one request, end to end
    request_timeout: Duration,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, pipeline: Arc<AdmissionPipeline>) -> Self {
        Self {
            addr,
            pipeline,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The full router, with tracing and timeout layers applied.
    pub fn router(&self) -> Router {
        self.with_layers(routes(self.pipeline.clone()))
    }

    fn with_layers(&self, router: Router) -> Router {
        router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.request_timeout,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server stops accepting connections when `signal` resolves and
    /// returns once in-flight requests finish.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            GatekeeperError::Io(e)
        })?;

        info!(
            addr = %self.addr,
            request_timeout_ms = self.request_timeout.as_millis() as u64,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GatekeeperError::Io(e)
        })
    }
}
