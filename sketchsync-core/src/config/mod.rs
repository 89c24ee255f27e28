//! Configuration for a scene session
//!
//! Settings come from defaults or a TOML file and are validated before
//! use. Durations are written in humantime form (`"300ms"`, `"2s"`).

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Scene session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Undo/redo history
    pub history: HistoryConfig,

    /// Outgoing sync messages
    pub sync: SyncConfig,

    /// Change notifications for the renderer
    pub notifications: NotificationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Undo/redo history configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of committed batches kept
    pub capacity: usize,

    /// Quiet period after which a continuous gesture is committed
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

/// Sync outbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How often the background flusher drains the outbox
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Records per message before splitting
    pub max_elements_per_message: usize,
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Broadcast buffer; slow subscribers lag past this many notifications
    pub channel_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,

    /// Include thread ids
    pub with_thread_ids: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 100, debounce: Duration::from_millis(300) }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { flush_interval: Duration::from_millis(50), max_elements_per_message: 500 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting a scene relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero("history.capacity", self.history.capacity as u128)?;
        nonzero("history.debounce", self.history.debounce.as_nanos())?;
        nonzero("sync.flush_interval", self.sync.flush_interval.as_nanos())?;
        nonzero("sync.max_elements_per_message", self.sync.max_elements_per_message as u128)?;
        // tokio::sync::broadcast panics on a zero capacity
        nonzero("notifications.channel_capacity", self.notifications.channel_capacity as u128)?;

        self.logging
            .level
            .parse::<LogLevel>()
            .map_err(|_| ConfigError::UnknownLogLevel(self.logging.level.clone()))?;

        Ok(())
    }

    /// Write configuration as pretty TOML
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}

fn nonzero(field: &'static str, value: u128) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange { field, reason: "must be greater than 0" });
    }
    Ok(())
}
