//! Configuration management for Gatekeeper.
//!
//! Configuration is read once at startup from an optional YAML file layered
//! with `GATEKEEPER__`-prefixed environment variables, e.g.
//! `GATEKEEPER__CREDENTIALS__SECRET` or `GATEKEEPER__STORE__REDIS_URL`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::Cookie;
use config::{Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::admission::StoreFailureMode;
use crate::auth::{JwtVerifier, TokenIssuer, ACCESS_TOKEN_COOKIE};
use crate::error::{GatekeeperError, Result};
use crate::ratelimit::{CounterStore, MemoryCounterStore, RedisCounterStore, RetryPolicy};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Credential verification configuration
    pub credentials: CredentialsConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Forward-auth HTTP address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Deadline for one forward-auth request in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_request_timeout() -> u64 {
    2000
}

/// Which counter store backs the rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis instance
    #[default]
    Redis,
    /// Process-local store, only correct with a single gatekeeper process
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix prepended to every counter key
    #[serde(default)]
    pub key_prefix: String,

    /// Deadline for one rate limit check in milliseconds
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,

    /// Retries for transient network errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: String::new(),
            timeout_ms: default_store_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Open the configured counter store.
    pub async fn connect(&self) -> Result<Arc<dyn CounterStore>> {
        match self.backend {
            StoreBackend::Redis => {
                let retry = RetryPolicy {
                    max_retries: self.max_retries,
                    base_backoff: self.retry_backoff(),
                };
                let store = RedisCounterStore::connect(&self.redis_url, &self.key_prefix, retry).await?;
                Ok(Arc::new(store))
            }
            StoreBackend::Memory => {
                warn!("Using the in-memory counter store; run a single gatekeeper process");
                Ok(Arc::new(MemoryCounterStore::new()))
            }
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_store_timeout() -> u64 {
    250
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    25
}

/// Credential configuration.
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    /// HMAC secret used to sign and verify access tokens
    pub secret: SecretString,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Cookie carrying the access token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Deadline for one credential verification in milliseconds
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_ms: u64,
}

impl CredentialsConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn verifier(&self) -> JwtVerifier {
        JwtVerifier::new(&self.secret)
    }

    /// Token issuer for the login flow, signing with `token_ttl_secs`.
    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(&self.secret, self.token_ttl())
    }

    /// Session cookie for a successful login.
    pub fn session_cookie(&self, subject_id: i64, username: &str) -> Result<Cookie<'static>> {
        let cookie = self
            .token_issuer()
            .issue_cookie(&self.cookie_name, subject_id, username)?;
        Ok(cookie)
    }
}

fn default_token_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cookie_name() -> String {
    ACCESS_TOKEN_COOKIE.to_string()
}

fn default_verify_timeout() -> u64 {
    250
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Behavior when the counter store cannot answer
    #[serde(default)]
    pub failure_mode: StoreFailureMode,

    /// Path to the YAML route policy file
    #[serde(default)]
    pub policy_path: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file with environment
    /// overrides, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: GatekeeperConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        let config: GatekeeperConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.secret.expose_secret().is_empty() {
            return Err(GatekeeperError::Config(
                "credentials.secret is required".to_string(),
            ));
        }
        if self.credentials.cookie_name.is_empty() {
            return Err(GatekeeperError::Config(
                "credentials.cookie_name must not be empty".to_string(),
            ));
        }
        if self.credentials.token_ttl_secs == 0 {
            return Err(GatekeeperError::Config(
                "credentials.token_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.credentials.verify_timeout_ms == 0 {
            return Err(GatekeeperError::Config(
                "credentials.verify_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(GatekeeperError::Config(
                "store.timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(GatekeeperError::Config(
                "server.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_empty() {
            return Err(GatekeeperError::Config(
                "store.redis_url is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialError, CredentialVerifier};
    use crate::ratelimit::StoreError;
    use std::io::Write;

    const MINIMAL: &str = r#"
credentials:
  secret: "s3cret"
"#;

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://127.0.0.1:6379/");
        assert_eq!(config.store.timeout(), Duration::from_millis(250));
        assert_eq!(config.store.max_retries, 3);
        assert_eq!(config.store.retry_backoff(), Duration::from_millis(25));
        assert_eq!(config.credentials.token_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.credentials.cookie_name, "access_token");
        assert_eq!(config.credentials.verify_timeout(), Duration::from_millis(250));
        assert_eq!(config.rate_limiting.failure_mode, StoreFailureMode::FailClosed);
        assert!(config.rate_limiting.policy_path.is_none());
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
  request_timeout_ms: 1500
store:
  backend: memory
  key_prefix: "gk:"
  timeout_ms: 100
credentials:
  secret: "s3cret"
  token_ttl_secs: 3600
rate_limiting:
  failure_mode: fail_open
  policy_path: /etc/gatekeeper/routes.yaml
logging:
  format: json
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.http_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.server.request_timeout(), Duration::from_millis(1500));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.key_prefix, "gk:");
        assert_eq!(config.credentials.token_ttl_secs, 3600);
        assert_eq!(config.rate_limiting.failure_mode, StoreFailureMode::FailOpen);
        assert_eq!(
            config.rate_limiting.policy_path.as_deref(),
            Some(Path::new("/etc/gatekeeper/routes.yaml"))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_missing_secret_rejected() {
        let result = GatekeeperConfig::from_yaml("server:\n  request_timeout_ms: 100\n");
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = GatekeeperConfig::from_yaml("credentials:\n  secret: \"\"\n");
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = "credentials:\n  secret: x\nstore:\n  timeout_ms: 0\n";
        assert!(GatekeeperConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = "credentials:\n  secret: x\nstore:\n  backend: etcd\n";
        assert!(GatekeeperConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_file_with_env_override() {
        let mut path = std::env::temp_dir();
        path.push(format!("gatekeeper-config-{}.yaml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        std::env::set_var("GKCFGTEST__STORE__KEY_PREFIX", "env:");
        std::env::set_var("GKCFGTEST__RATE_LIMITING__FAILURE_MODE", "fail_open");
        let config = GatekeeperConfig::load_with_prefix(Some(&path), "GKCFGTEST").unwrap();
        std::env::remove_var("GKCFGTEST__STORE__KEY_PREFIX");
        std::env::remove_var("GKCFGTEST__RATE_LIMITING__FAILURE_MODE");
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.store.key_prefix, "env:");
        assert_eq!(config.rate_limiting.failure_mode, StoreFailureMode::FailOpen);
        assert_eq!(config.credentials.secret.expose_secret(), "s3cret");
    }

    #[tokio::test]
    async fn test_login_cookie_uses_configured_ttl() {
        let yaml = "credentials:\n  secret: s3cret\n  token_ttl_secs: 3600\n  cookie_name: sid\n";
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.credentials.token_issuer().ttl(), Duration::from_secs(3600));

        let cookie = config.credentials.session_cookie(4, "carol").unwrap();
        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(1)));

        let claims = config.credentials.verifier().verify(cookie.value()).await.unwrap();
        assert_eq!(claims.subject_id, 4);
    }

    #[test]
    fn test_credential_error_converts() {
        let err: GatekeeperError = CredentialError::Signing("bad key".to_string()).into();
        assert!(matches!(err, GatekeeperError::Credential(CredentialError::Signing(_))));
        assert_eq!(
            err.to_string(),
            "Credential error: failed to sign credential: bad key"
        );
    }

    #[tokio::test]
    async fn test_memory_store_connects() {
        let yaml = "credentials:\n  secret: x\nstore:\n  backend: memory\n";
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        let store = config.store.connect().await.unwrap();
        assert_eq!(store.increment("k").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_bad_redis_url_is_store_error() {
        let store = StoreConfig {
            redis_url: "not a redis url".to_string(),
            ..StoreConfig::default()
        };

        let err = store.connect().await.err().unwrap();
        assert!(matches!(err, GatekeeperError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_shipped_config_file() {
        let config = GatekeeperConfig::from_yaml(include_str!("../config/gatekeeper.yaml")).unwrap();
        assert_eq!(
            config.rate_limiting.policy_path.as_deref(),
            Some(Path::new("config/routes.yaml"))
        );
        assert_eq!(config.store.backend, StoreBackend::Redis);
    }
}
