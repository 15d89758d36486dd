use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Queue service configuration.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Shared secret workers must present in the `x-worker-secret` header
    pub worker_secret: String,
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Base URL of the queue service
    #[serde(default = "default_queue_url")]
    pub queue_url: String,

    /// Shared secret sent with every lease/complete/fail call
    pub worker_secret: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout for each call to the queue service
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Dry-run mode: handlers report synthetic success without touching the target
    #[serde(default)]
    pub soft_mode: bool,

    /// Accepted job types (comma-separated). Empty accepts all.
    #[serde(default)]
    pub job_types: Vec<String>,

    /// Fail jobs with no registered handler instead of completing them as skipped
    #[serde(default)]
    pub reject_unknown_types: bool,

    #[serde(default = "default_nav_max_attempts")]
    pub nav_max_attempts: u32,

    #[serde(default = "default_nav_timeout_ms")]
    pub nav_timeout_ms: u64,

    #[serde(default = "default_nav_backoff_base_ms")]
    pub nav_backoff_base_ms: u64,

    #[serde(default = "default_nav_backoff_jitter_ms")]
    pub nav_backoff_jitter_ms: u64,

    /// Pause after the soft-reset visit
    #[serde(default = "default_nav_settle_ms")]
    pub nav_settle_ms: u64,

    /// Requeue jobs whose failure is transient (e.g. navigation exhausted)
    #[serde(default)]
    pub requeue_transient: bool,

    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Listen address of the worker's Prometheus exporter. Empty disables it.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_queue_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_nav_max_attempts() -> u32 {
    3
}

fn default_nav_timeout_ms() -> u64 {
    30_000
}

fn default_nav_backoff_base_ms() -> u64 {
    1_200
}

fn default_nav_backoff_jitter_ms() -> u64 {
    800
}

fn default_nav_settle_ms() -> u64 {
    1_000
}

fn default_max_requeues() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    60_000
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("WORKER_SECRET must not be empty")]
    EmptySecret,

    #[error("NAV_MAX_ATTEMPTS must be at least 1")]
    NoAttempts,

    #[error("METRICS_ADDR is not a socket address: {0}")]
    MetricsAddr(String),
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        if config.worker_secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        Ok(config)
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit key/value pairs (keys in upper snake case).
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config: Self = envy::from_iter(vars)?;
        if config.worker_secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if config.nav_max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        config.metrics_addr = config.metrics_addr.trim().to_string();
        if !config.metrics_addr.is_empty() && config.metrics_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::MetricsAddr(config.metrics_addr));
        }
        config.job_types.retain(|t| !t.trim().is_empty());
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Where to serve worker metrics, or `None` when disabled.
    pub fn metrics_listen_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr.parse().ok()
    }
}
