//! Logging setup for applications embedding the scene engine
//!
//! The engine itself only emits `tracing` events. Hosts call one of the
//! `init_logging*` functions once to install a subscriber; `RUST_LOG`
//! overrides the configured level when set.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// The minimum log level to display
    pub level: LogLevel,
    /// Whether to include target module information
    pub with_target: bool,
    /// Whether to include thread ids (useful with the debounce task)
    pub with_thread_ids: bool,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Limit the level to this crate; dependencies stay at `warn`
    pub crate_only: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            with_thread_ids: false,
            json_format: false,
            crate_only: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    /// Build from the `[logging]` section of a scene config
    pub fn from_settings(settings: &LoggingConfig) -> Result<Self, LoggingError> {
        Ok(Self {
            level: settings.level.parse()?,
            with_target: settings.with_target,
            with_thread_ids: settings.with_thread_ids,
            json_format: settings.json_format,
            crate_only: false,
        })
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn crate_only(mut self, enabled: bool) -> Self {
        self.crate_only = enabled;
        self
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        if self.crate_only {
            self.level.crate_directive()
        } else {
            self.level.as_str().to_string()
        }
    }
}

/// Initialize logging with the default configuration
///
/// # Example
/// ```
/// use sketchsync_core::logging::init_logging;
///
/// init_logging().expect("Failed to initialize logging");
/// ```
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with a custom configuration
///
/// # Example
/// ```
/// use sketchsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug).with_target(false).crate_only(true);
///
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    let fmt_layer = fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids);

    if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from the `[logging]` section of a scene config
pub fn init_logging_from_settings(settings: &LoggingConfig) -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::from_settings(settings)?)
}
