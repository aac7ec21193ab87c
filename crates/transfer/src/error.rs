//! Transfer error types

use thiserror::Error;

/// Errors raised by the transfer subsystem.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No session exists for the content id
    #[error("No transfer session for content {0}")]
    NoSession(String),

    /// Chunk index outside the session's range
    #[error("Chunk index {index} out of range (total {total})")]
    ChunkOutOfRange { index: u32, total: u32 },

    /// Session is in a state that cannot accept the operation
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
