//! Core error types

use thiserror::Error;

/// Errors raised by the core collaborators (storage, crypto, config).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Item or blob storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cryptographic operation failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
