//! Error types for mesh protocol operations.

use thiserror::Error;

/// Errors that can occur in the protocol engine.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Packet could not be decoded or encoded
    #[error("Packet codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Failure in a core collaborator (storage, crypto)
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] veilmesh_core::CoreError),

    /// Engine asked to operate before local state finished loading
    #[error("Local state not ready")]
    NotReady,

    /// Peer not found
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Content not found
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Recipient's keys are unknown, message cannot be sealed
    #[error("No exchange key known for {0}")]
    NoExchangeKey(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
