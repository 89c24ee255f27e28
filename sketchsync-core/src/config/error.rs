//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse scene configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize scene configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A setting that would leave a scene component unusable
    #[error("{field} {reason}")]
    OutOfRange { field: &'static str, reason: &'static str },

    #[error("Unknown log level: {0}")]
    UnknownLogLevel(String),
}
