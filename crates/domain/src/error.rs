//! Domain error types

use thiserror::Error;

/// Errors raised by content-model operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Comment nesting exceeds the depth cap
    #[error("Comment nesting too deep (max {0})")]
    DepthExceeded(usize),

    /// Duplicate id where uniqueness is required
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
