//! Engine error types
//!
//! One taxonomy for everything the engine can report. Remote faults are
//! normalized into `Network`, `Timeout` and `Upstream` no matter which
//! transport produced them; `Validation` is always raised locally before any
//! remote call is attempted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the engine and its collaborators.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Local precondition failure (incomplete profile, empty search query, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable storage read/write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport-level fault talking to the analysis service
    #[error("Network error: {0}")]
    Network(String),

    /// The analysis service did not answer within the configured bound
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The analysis service answered, but with a failure or malformed data
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// No authenticated subject, or a failed challenge
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for engine errors
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The copyable tag carried by failed analysis/search results.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Storage(_) => ErrorKind::Storage,
            EngineError::Network(_) => ErrorKind::Network,
            EngineError::Timeout(_) => ErrorKind::Timeout,
            EngineError::Upstream(_) => ErrorKind::Upstream,
            EngineError::Session(_) => ErrorKind::Session,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization failed: {}", err))
    }
}

/// Error category without the message, small enough to live inside result states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Storage,
    Network,
    Timeout,
    Upstream,
    Session,
    Config,
}
