//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub resync: ResyncConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Poll timer, cache and retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_ms: u64,

    #[serde(default)]
    pub max_retry_delay_ms: Option<u64>,

    #[serde(default)]
    pub retry_permanent_errors: bool,
}

fn default_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_cache_ttl() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay() -> u64 {
    1000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            cache_ttl_ms: default_cache_ttl(),
            max_retries: default_max_retries(),
            base_retry_delay_ms: default_base_retry_delay(),
            max_retry_delay_ms: None,
            retry_permanent_errors: false,
        }
    }
}

/// Post-transaction resync settings
#[derive(Debug, Clone, Deserialize)]
pub struct ResyncConfig {
    #[serde(default = "default_confirmation_delay")]
    pub confirmation_delay_ms: u64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_ms: u64,
}

fn default_confirmation_delay() -> u64 {
    5000
}

fn default_confirmation_timeout() -> u64 {
    30_000
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            confirmation_delay_ms: default_confirmation_delay(),
            confirmation_timeout_ms: default_confirmation_timeout(),
        }
    }
}

/// Balance API settings
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_request_timeout() -> u64 {
    10_000
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Account to track when none is given on the command line
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountConfig {
    pub account_id: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("grovesync").join("config.toml")),
            Some(PathBuf::from("/etc/grovesync/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Polling overrides
        if let Some(v) = env_parse("GROVESYNC_POLL_INTERVAL_MS") {
            self.polling.interval_ms = v;
        }
        if let Some(v) = env_parse("GROVESYNC_CACHE_TTL_MS") {
            self.polling.cache_ttl_ms = v;
        }
        if let Some(v) = env_parse("GROVESYNC_MAX_RETRIES") {
            self.polling.max_retries = v;
        }
        if let Some(v) = env_parse("GROVESYNC_RETRY_DELAY_MS") {
            self.polling.base_retry_delay_ms = v;
        }

        // Source overrides
        if let Ok(url) = std::env::var("GROVESYNC_API_URL") {
            self.source.base_url = url;
        }

        // Account override
        if let Ok(account_id) = std::env::var("GROVESYNC_ACCOUNT_ID") {
            self.account.account_id = Some(account_id);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("GROVESYNC_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GROVESYNC_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Grovesync Configuration
#
# Environment variables override these settings:
# - GROVESYNC_POLL_INTERVAL_MS
# - GROVESYNC_CACHE_TTL_MS
# - GROVESYNC_MAX_RETRIES
# - GROVESYNC_RETRY_DELAY_MS
# - GROVESYNC_API_URL
# - GROVESYNC_ACCOUNT_ID
# - GROVESYNC_LOG_LEVEL
# - GROVESYNC_LOG_FORMAT

[polling]
# Time between poll cycles (ms)
interval_ms = 30000

# How long a fetched balance stays fresh (ms)
cache_ttl_ms = 30000

# Attempts per fetch, including the first
max_retries = 3

# Delay before the first retry; doubles each retry (ms)
base_retry_delay_ms = 1000

# Optional cap on a single retry delay (ms)
# max_retry_delay_ms = 10000

# Retry "not found" and malformed responses too
retry_permanent_errors = false

[resync]
# Wait after a transaction before refreshing balances (ms)
confirmation_delay_ms = 5000

# Give up waiting for confirmation after this long (ms)
confirmation_timeout_ms = 30000

[source]
# Balance API base URL
base_url = "http://localhost:3000/api"

# Per-request timeout (ms)
request_timeout_ms = 10000

[account]
# Account to track
# account_id = "0.0.1234"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
