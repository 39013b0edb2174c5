use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use crate::common::circuit_breaker::CircuitBreakerConfig;
use crate::common::dedup::DedupOptions;

// Default configuration values
const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIME_MS: u64 = 30_000;
const DEFAULT_BREAKER_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Environment variable naming the API base URL
pub const ENV_API_URL: &str = "BUDGET_API_URL";
/// Environment variable naming the token file
pub const ENV_TOKEN_STORE: &str = "BUDGET_TOKEN_STORE";
/// Environment variable for the HTTP timeout in seconds
pub const ENV_REQUEST_TIMEOUT: &str = "BUDGET_REQUEST_TIMEOUT_SECS";
/// Environment variable naming a JSON config file
pub const ENV_CONFIG_PATH: &str = "BUDGET_CONFIG_PATH";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Root of the budget tracker API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Where tokens are persisted. `None` keeps them in memory.
    #[serde(default = "default_token_store_path")]
    pub token_store_path: Option<PathBuf>,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_time_ms")]
    pub recovery_time_ms: u64,
    #[serde(default = "default_breaker_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Request de-duplication settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

// Default functions
fn default_api_base_url() -> String {
    std::env::var(ENV_API_URL).unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string())
}

fn default_request_timeout() -> u64 {
    std::env::var(ENV_REQUEST_TIMEOUT)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
}

fn default_token_store_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ENV_TOKEN_STORE) {
        return Some(PathBuf::from(path));
    }

    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    Some(base.join(".budget-client").join("tokens.json"))
}

fn default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_recovery_time_ms() -> u64 {
    DEFAULT_RECOVERY_TIME_MS
}

fn default_breaker_timeout_ms() -> u64 {
    DEFAULT_BREAKER_TIMEOUT_MS
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
            token_store_path: default_token_store_path(),
            breaker: BreakerSettings::default(),
            dedup: DedupSettings::default(),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_time_ms: default_recovery_time_ms(),
            request_timeout_ms: default_breaker_timeout_ms(),
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl BreakerSettings {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_time: Duration::from_millis(self.recovery_time_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

impl DedupSettings {
    pub fn to_options(&self) -> DedupOptions {
        DedupOptions::default()
            .with_max_retries(self.max_retries)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }
}

impl ClientConfig {
    /// HTTP timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Environment variables win over anything read from a file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Ok(path) = std::env::var(ENV_TOKEN_STORE) {
            self.token_store_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = std::env::var(ENV_REQUEST_TIMEOUT)
            .ok()
            .and_then(|val| val.parse().ok())
        {
            self.request_timeout_secs = timeout;
        }
    }

    /// Check values that would only fail later at request time
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url '{}'", self.api_base_url))?;
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be greater than zero"
        );
        anyhow::ensure!(
            self.breaker.failure_threshold > 0,
            "breaker.failure_threshold must be greater than zero"
        );
        Ok(())
    }
}

/// Load configuration from an optional JSON file, then apply environment
/// overrides.
///
/// Without an explicit path `BUDGET_CONFIG_PATH` is consulted. A missing file
/// is not an error.
pub async fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) if path.exists() => {
            let config_str = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: ClientConfig = serde_json::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            debug!("Loaded configuration from {}", path.display());
            config
        }
        Some(path) => {
            info!("No configuration at {}, using defaults", path.display());
            ClientConfig::default()
        }
        None => ClientConfig::default(),
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub async fn save_config(path: &Path, config: &ClientConfig) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(path, config_str).await?;
    debug!("Saved configuration to {}", path.display());

    Ok(())
}
