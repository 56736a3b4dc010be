//! CI transport configuration with YAML/JSON support and field-wise overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default CI task endpoint
pub const DEFAULT_URL: &str = "https://cloud.all-hw.com/ci/usertask";

/// Firmware image location relative to the project directory
pub const DEFAULT_FIRMWARE_RELATIVE_PATH: &str = "build/zephyr/zephyr.hex";

/// CI transport configuration
///
/// Holds the tunables sent to the CI service with every task plus the local
/// polling behaviour. Values are never mutated in place: apply a
/// [`ConfigOverrides`] with [`CiConfig::merged`] to get a new configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiConfig {
    /// CI service endpoint (used for both task submission and status)
    #[serde(default = "default_url")]
    pub url: String,

    /// API key sent as the `key` query parameter
    ///
    /// No key is built in; the public CI endpoint rejects submissions
    /// without one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Time the board is allowed to run one task, in seconds (default: 20)
    #[serde(default = "default_task_timeout")]
    pub task_timeout: u64,

    /// UART symbol rate of the board (default: 115200)
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Ask the CI service to keep a task log
    #[serde(default)]
    pub log: bool,

    /// Firmware image path; derived from the working directory when unset
    #[serde(default)]
    pub firmware: Option<PathBuf>,

    /// Local timing settings
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_task_timeout() -> u64 {
    20
}

fn default_rate() -> u32 {
    115_200
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            task_timeout: default_task_timeout(),
            rate: default_rate(),
            log: false,
            firmware: None,
            timeouts: TimeoutsConfig::default(),
        }
    }
}

/// Timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Interval between submission retries and status polls (default: 500ms)
    #[serde(default = "default_poll_interval")]
    pub poll_ms: u64,

    /// HTTP request timeout in milliseconds (default: 30s)
    #[serde(default = "default_request_timeout")]
    pub request_ms: u64,

    /// HTTP connect timeout in milliseconds (default: 10s)
    #[serde(default = "default_connect_timeout")]
    pub connect_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_interval(),
            request_ms: default_request_timeout(),
            connect_ms: default_connect_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    500 // 500ms
}

fn default_request_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_connect_timeout() -> u64 {
    10_000 // 10 seconds
}

impl TimeoutsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }
}

/// Per-call option overrides
///
/// Every field is optional; `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub task_timeout: Option<u64>,
    #[serde(default)]
    pub rate: Option<u32>,
    #[serde(default)]
    pub log: Option<bool>,
    #[serde(default)]
    pub firmware: Option<PathBuf>,
    #[serde(default)]
    pub poll_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl CiConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder(url: impl Into<String>) -> CiConfigBuilder {
        CiConfigBuilder::new(url)
    }

    /// Return a copy with every present override applied
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        let mut config = self.clone();
        if let Some(url) = &overrides.url {
            config.url = url.clone();
        }
        if let Some(key) = &overrides.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(timeout) = overrides.task_timeout {
            config.task_timeout = timeout;
        }
        if let Some(rate) = overrides.rate {
            config.rate = rate;
        }
        if let Some(log) = overrides.log {
            config.log = log;
        }
        if let Some(firmware) = &overrides.firmware {
            config.firmware = Some(firmware.clone());
        }
        if let Some(poll_ms) = overrides.poll_ms {
            config.timeouts.poll_ms = poll_ms;
        }
        config
    }

    /// Check that the endpoint is a usable absolute URL
    pub fn validate(&self) -> Result<url::Url, ConfigError> {
        url::Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.url, e)))
    }
}

/// Builder for CiConfig
pub struct CiConfigBuilder {
    config: CiConfig,
}

impl CiConfigBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: CiConfig {
                url: url.into(),
                ..CiConfig::default()
            },
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Set the board-side task timeout in seconds
    pub fn task_timeout(mut self, secs: u64) -> Self {
        self.config.task_timeout = secs;
        self
    }

    pub fn rate(mut self, rate: u32) -> Self {
        self.config.rate = rate;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.config.log = log;
        self
    }

    pub fn firmware(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.firmware = Some(path.into());
        self
    }

    /// Set the poll/retry interval in milliseconds
    pub fn poll_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.poll_ms = ms;
        self
    }

    /// Set HTTP request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = ms;
        self
    }

    pub fn build(self) -> CiConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}
