//! Autosave configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default debounce window after an edit before an automatic save fires.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1500;
/// Default heartbeat period; bounds staleness under continuous typing.
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
/// Default wall-clock timeout for a single draft request.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8_000;

/// Autosave controller configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Base URL of the drafts API, e.g. `http://localhost:8080/api`.
    pub server_url: String,
    /// Directory for the local mirror store.
    pub data_dir: PathBuf,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_ms: u64,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            server_url: "http://localhost:8080".to_string(),
            data_dir: PathBuf::from(&home).join(".draftkeeper"),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl AutosaveConfig {
    /// Load configuration with priority: env vars > config file > defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::Parse(path.clone(), e))?;
        }

        if let Ok(url) = std::env::var("DRAFTKEEPER_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(dir) = std::env::var("DRAFTKEEPER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/draftkeeper/config.yaml
    pub fn default_config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".config")
            .join("draftkeeper")
            .join("config.yaml")
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse config file '{0}': {1}")]
    Parse(PathBuf, serde_yaml::Error),
}
