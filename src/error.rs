//! Error types for the context engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Engine Error Enum ==
/// Unified error type for the cache, optimizer and monitor.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Payload could not be encoded or decoded for storage
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation called after the component was disposed
    #[error("{0} is not initialized (disposed)")]
    NotInitialized(&'static str),

    /// Disk mirror failure; logged by the mirror, never returned from cache calls
    #[error("Disk I/O error: {0}")]
    DiskIo(String),

    /// Invalid configuration, thresholds or budget
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single payload is larger than the whole store
    #[error("Entry {key} is {size} bytes, exceeds store capacity of {max} bytes")]
    EntryTooLarge { key: String, size: u64, max: u64 },

    /// Invalidation pattern is not a valid regular expression
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    /// An optimizer stage failed
    #[error("Optimizer stage '{stage}' failed: {message}")]
    Pipeline { stage: &'static str, message: String },
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::DiskIo(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the context engine.
pub type Result<T> = std::result::Result<T, EngineError>;
