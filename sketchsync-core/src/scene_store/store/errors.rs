/*
    errors.rs - Error types for the scene store

    Defines all error types that can occur in:
    - Local element writes
    - Remote element application
    - Wire and snapshot codecs
    - Snapshot persistence

    None of these are fatal: every error is a per-operation outcome the
    caller can log, ignore (stale remote deltas) or surface to the user.
*/

use thiserror::Error;

/// Errors that can occur in the scene store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation targets an id the store has never seen
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Creation raced with a live element of the same id
    #[error("Duplicate element id: {0}")]
    DuplicateId(String),

    /// Incoming element is missing required fields or carries invalid values
    #[error("Malformed element: {0}")]
    MalformedElement(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Message or snapshot written by an unknown format revision
    #[error("Unsupported format version: {0}")]
    UnsupportedFormat(u8),

    /// Corrupted data detected
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Storage I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A thread panicked while holding the scene lock
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether the error is a missing-field/invalid-value problem with input
    /// data rather than a local failure
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::MalformedElement(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Deserialization(err.to_string())
    }
}
