//! Engine Configuration
//!
//! Tunables for the advisory time-based policies of the engine. Loaded
//! from TOML or JSON, every field has a default.
//!
//! ```toml
//! traffic_poll_interval_ms = 1000
//! dropped_after_polls = 5
//! server_list_refresh_secs = 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often the dropped-connection monitor reads the rx counter
    #[serde(default = "default_poll_interval_ms")]
    pub traffic_poll_interval_ms: u64,
    /// Number of polls after which an unchanged counter means "dropped"
    #[serde(default = "default_dropped_after_polls")]
    pub dropped_after_polls: u32,
    /// Age after which the server list should be fetched again
    #[serde(default = "default_server_list_refresh_secs")]
    pub server_list_refresh_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_dropped_after_polls() -> u32 {
    5
}

fn default_server_list_refresh_secs() -> u64 {
    3600 // discovery asks clients to refresh at most hourly
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traffic_poll_interval_ms: default_poll_interval_ms(),
            dropped_after_polls: default_dropped_after_polls(),
            server_list_refresh_secs: default_server_list_refresh_secs(),
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        match ext {
            "toml" => Self::from_toml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn traffic_poll_interval(&self) -> Duration {
        Duration::from_millis(self.traffic_poll_interval_ms)
    }

    pub fn server_list_max_age(&self) -> Duration {
        Duration::from_secs(self.server_list_refresh_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traffic_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("traffic_poll_interval_ms must be > 0".into()));
        }
        if self.dropped_after_polls < 2 {
            return Err(ConfigError::Invalid("dropped_after_polls must be >= 2".into()));
        }
        if self.server_list_refresh_secs == 0 {
            return Err(ConfigError::Invalid("server_list_refresh_secs must be > 0".into()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
