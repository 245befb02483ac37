//! Application settings and configuration management

use crate::backend::traits::ProviderKind;
use crate::error::{AppError, Result};
use crate::gateway::weights::ProviderWeights;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub mock: MockConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    /// Expose underlying provider errors in API responses
    #[serde(default)]
    pub debug_errors: bool,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Provider selection and failover
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Deterministically prefer this provider while its weight is nonzero
    #[serde(default)]
    pub primary: Option<ProviderKind>,
    /// Deployment override, takes precedence over the remote weights
    #[serde(default)]
    pub weights_override: Option<ProviderWeights>,
    /// JSON endpoint serving `{"providerA": n, "providerB": n}`
    #[serde(default)]
    pub remote_weights_url: Option<String>,
    #[serde(default = "default_weights_ttl")]
    pub weights_cache_ttl_secs: u64,
    #[serde(default = "default_true")]
    pub failover_enabled: bool,
    /// Route every request to the simulated provider
    #[serde(default)]
    pub mock_mode: bool,
}

fn default_weights_ttl() -> u64 {
    5
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            primary: None,
            weights_override: None,
            remote_weights_url: None,
            weights_cache_ttl_secs: default_weights_ttl(),
            failover_enabled: true,
            mock_mode: false,
        }
    }
}

/// Per-call timeout and retry envelope shared by all adapters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_call_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_call_timeout() -> u64 {
    8000
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_call_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

/// Bounds for status polling of submitted jobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_deadline")]
    pub deadline_secs: u64,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_poll_attempts() -> u32 {
    30
}

fn default_poll_deadline() -> u64 {
    120
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
            deadline_secs: default_poll_deadline(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Interval actually slept between polls. Stretched when needed so the
    /// attempts together reach the deadline.
    pub fn effective_interval(&self) -> Duration {
        let spread = self.deadline() / self.max_attempts.max(1);
        self.interval().max(spread)
    }

    /// Longest a job is followed before it is failed as expired
    pub fn window(&self) -> Duration {
        (self.effective_interval() * self.max_attempts).min(self.deadline())
    }
}

/// External provider credentials and request shaping
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub replicate: ProviderConfig,
    #[serde(default)]
    pub fal: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Template tag to provider model identifier
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_resolution")]
    pub default_resolution: u32,
    #[serde(default = "default_steps")]
    pub default_steps: u32,
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,
}

fn default_prompt_template() -> String {
    "{template} portrait of the subject, rendered in {style} style, highly detailed".to_string()
}

fn default_resolution() -> u32 {
    1024
}

fn default_steps() -> u32 {
    28
}

fn default_health_check_path() -> String {
    "/".to_string()
}

impl ProviderConfig {
    /// A key is present and not blank
    pub fn has_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.is_empty())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            models: HashMap::new(),
            prompt_template: default_prompt_template(),
            default_resolution: default_resolution(),
            default_steps: default_steps(),
            health_check_path: default_health_check_path(),
        }
    }
}

/// Simulated provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockConfig {
    #[serde(default = "default_mock_duration")]
    pub duration_secs: u64,
    #[serde(default = "default_mock_outputs")]
    pub output_count: u32,
    #[serde(default = "default_mock_assets")]
    pub asset_base_url: String,
}

fn default_mock_duration() -> u64 {
    90
}

fn default_mock_outputs() -> u32 {
    4
}

fn default_mock_assets() -> String {
    "http://localhost:8080/mock-assets".to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_mock_duration(),
            output_count: default_mock_outputs(),
            asset_base_url: default_mock_assets(),
        }
    }
}

/// Background refresh worker
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_concurrent() -> usize {
    16
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
}

fn default_health_interval() -> u64 {
    30
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultsConfig {
    /// Images returned to callers who have not paid
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

fn default_preview_limit() -> usize {
    1
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
        }
    }
}

/// A wrapper for API keys that never prints its value
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Configuration path is not valid UTF-8".to_string(),
            ))
        })?;

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("routing.failover_enabled", true)?
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefixed with IMAGEGEN_)
            .add_source(
                Environment::with_prefix("IMAGEGEN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0"));
        }

        if let Some(weights) = &self.routing.weights_override {
            if !weights.is_valid() {
                return Err(config_error(
                    "Provider weights must be finite and non-negative",
                ));
            }
        }

        if self.retry.timeout_ms == 0 {
            return Err(config_error("retry.timeout_ms must be greater than 0"));
        }

        if self.polling.interval_ms == 0 || self.polling.max_attempts == 0 {
            return Err(config_error(
                "polling.interval_ms and polling.max_attempts must be greater than 0",
            ));
        }

        if self.mock.duration_secs == 0 {
            return Err(config_error("mock.duration_secs must be greater than 0"));
        }

        // Simulated jobs must be able to finish before polling gives up
        if self.routing.mock_mode
            && self.polling.window() < Duration::from_secs(self.mock.duration_secs)
        {
            return Err(config_error(
                "polling window is shorter than mock.duration_secs; raise polling.deadline_secs",
            ));
        }

        if self.worker.queue_capacity == 0 || self.worker.max_concurrent == 0 {
            return Err(config_error("worker limits must be greater than 0"));
        }

        Ok(())
    }

    /// Providers that have credentials configured
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        if self.providers.replicate.has_key() {
            kinds.push(ProviderKind::Replicate);
        }
        if self.providers.fal.has_key() {
            kinds.push(ProviderKind::Fal);
        }
        kinds
    }
}

fn config_error(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            routing: RoutingConfig::default(),
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
            providers: ProvidersConfig::default(),
            mock: MockConfig::default(),
            worker: WorkerConfig::default(),
            health: HealthConfig::default(),
            results: ResultsConfig::default(),
            debug_errors: false,
        }
    }
}
