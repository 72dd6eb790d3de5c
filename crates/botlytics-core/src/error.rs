//! Error types for botlytics-core

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for botlytics-core
#[derive(Error, Debug)]
pub enum Error {
    /// Storage errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Row key / session id errors
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the ordered partitioned store.
///
/// `NotFound` and `Conflict` are expected control-flow signals: a missing
/// user pointer means "new user", a missing session record drives recovery,
/// and a conflicting create means the row already landed. Only
/// `Unavailable` represents an actual failure, and it is propagated without
/// any internal retry.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed row does not exist.
    #[error("record not found")]
    NotFound,

    /// A create-if-absent hit an existing row.
    #[error("record already exists")]
    Conflict,

    /// Any other store failure. Propagated to the caller; retry policy
    /// belongs to the collaborator or caller.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true for the legitimate-empty-state signal.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true when a conditional create lost to an existing row.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Row key / session id decode errors.
#[derive(Error, Debug)]
pub enum KeyError {
    /// The key prefix cannot be parsed as base-36. Indicates a corrupted or
    /// foreign-format identifier; never silently defaulted.
    #[error("malformed key: {0}")]
    Malformed(String),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("failed to parse config: {0}")]
    ParseFailed(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}
