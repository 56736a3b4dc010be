//! Configuration file handling for allhw-cli
//!
//! The file is the same shape as [`CiConfig`], written in TOML:
//!
//! ```toml
//! url = "https://cloud.all-hw.com/ci/usertask"
//! api_key = "..."
//! rate = 115200
//!
//! [timeouts]
//! poll_ms = 500
//! ```

use std::path::{Path, PathBuf};

use allhw_transport::{CiConfig, ConfigOverrides};
use anyhow::{Context, Result};

/// Load configuration from the default config file, or defaults if absent
pub fn load() -> Result<CiConfig> {
    let config_path = config_path()?;
    if config_path.exists() {
        load_from(&config_path)
    } else {
        Ok(CiConfig::default())
    }
}

/// Load configuration from a specific path
pub fn load_from(path: &Path) -> Result<CiConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Get the default config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("allhw-cli");

    Ok(config_dir.join("config.toml"))
}

/// Command-line values layered over the config file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub poll_ms: Option<u64>,
}

impl CliOverrides {
    pub fn apply(&self, config: &CiConfig) -> CiConfig {
        config.merged(&ConfigOverrides {
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            poll_ms: self.poll_ms,
            ..Default::default()
        })
    }
}
