use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::admission::AdmissionPipeline;
use gatekeeper::auth::{AuthenticationGate, CookieCredential};
use gatekeeper::config::{GatekeeperConfig, LogFormat};
use gatekeeper::http::HttpServer;
use gatekeeper::policy::RouteRegistry;
use gatekeeper::ratelimit::RateLimiter;

/// Request admission gateway: rate limiting and credential verification.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the forward-auth listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatekeeperConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(addr) = cli.http_addr {
        config.server.http_addr = addr;
    }

    init_tracing(config.logging.format);

    info!("Starting Gatekeeper Admission Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        store = ?config.store.backend,
        failure_mode = ?config.rate_limiting.failure_mode,
        "Configuration loaded"
    );

    // Counter store
    let store = config
        .store
        .connect()
        .await
        .context("Failed to connect to the counter store")?;
    let limiter = RateLimiter::with_timeout(store.clone(), config.store.timeout());
    info!("Rate limiter initialized");

    // Route policies
    let registry = match &config.rate_limiting.policy_path {
        Some(path) => RouteRegistry::from_file(path)
            .with_context(|| format!("Failed to load route policies from {}", path.display()))?,
        None => {
            warn!("No route policy file configured; every route is protected and unlimited");
            RouteRegistry::new()
        }
    };

    // Credential verification
    let gate = AuthenticationGate::with_timeout(
        Arc::new(CookieCredential::new(config.credentials.cookie_name.clone())),
        Arc::new(config.credentials.verifier()),
        config.credentials.verify_timeout(),
    );
    info!(
        cookie = %config.credentials.cookie_name,
        token_ttl_secs = config.credentials.token_issuer().ttl().as_secs(),
        "Credential verification initialized"
    );

    let pipeline = Arc::new(AdmissionPipeline::new(
        Arc::new(registry),
        limiter,
        gate,
        config.rate_limiting.failure_mode,
    ));

    let http_server = HttpServer::new(config.server.http_addr, pipeline)
        .with_request_timeout(config.server.request_timeout());

    info!("Starting HTTP server on {}", config.server.http_addr);

    // Run the server with graceful shutdown on Ctrl+C
    http_server.serve_with_shutdown(shutdown_signal()).await?;

    drop(store);
    info!("Counter store connection closed");
    info!("Gatekeeper Admission Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
