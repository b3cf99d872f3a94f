//! Server configuration, loaded from environment variables.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration that cannot be defaulted is missing or malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Listener and adapter settings of the server binary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Pool size.
    pub database_max_connections: u32,
    /// Redis connection string for the checkpoint cache.
    pub redis_url: String,
    /// Lifetime of a cached checkpoint.
    pub checkpoint_cache_ttl: Duration,
    /// Bind address of the API.
    pub host: String,
    /// API port.
    pub port: u16,
    /// Port of the Prometheus scrape endpoint.
    pub metrics_port: u16,
    /// How long in-flight requests may run after a shutdown signal.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// Only `DATABASE_URL` is required.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            checkpoint_cache_ttl: Duration::from_secs(
                env::var("CHECKPOINT_CACHE_TTL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3600),
            ),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9090),
            shutdown_timeout: Duration::from_secs(
                env::var("SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    /// API bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Metrics bind address.
    #[must_use]
    pub fn metrics_address(&self) -> String {
        format!("{}:{}", self.host, self.metrics_port)
    }
}
