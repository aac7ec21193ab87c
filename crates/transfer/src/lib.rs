//! Chunked media transfer with adaptive concurrency and mesh recovery.
//!
//! A transfer session pulls a large media object chunk by chunk from one
//! source peer, pacing itself with an AIMD congestion window. When the
//! source stops answering, the session escalates to mesh recovery: the
//! engine floods a relay request through trusted peers and resumes the
//! session against whichever peer offers the content. All network and
//! storage I/O stays in the engine — this crate returns the actions to
//! perform as data.

pub mod error;
pub mod manager;
pub mod relay;
pub mod session;

pub use error::{TransferError, TransferResult};
pub use manager::{ChunkRequest, DownloadStart, TransferEvent, TransferManager};
pub use relay::{RelayCoordinator, SUPPRESSION_WINDOW_MS};
pub use session::{
    Listener, SessionStatus, TransferSession, MAX_CHUNK_RETRIES, RECOVERY_TIMEOUT_MS, WINDOW_MAX,
    WINDOW_START,
};
