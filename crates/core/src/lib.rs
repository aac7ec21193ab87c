//! Core functionality for the veilmesh decentralized social mesh.
//!
//! This crate provides the fundamental identifiers, configuration,
//! logging setup, and collaborator contracts (transport, crypto,
//! item/blob storage) used across the veilmesh ecosystem. The protocol
//! engine itself lives in `veilmesh-mesh`; everything here is the
//! ambient substrate it runs on.

pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod store;
pub mod transport;
pub mod types;

pub use config::{Config, MeshConfig, NodeConfig, SyncConfig, TransferConfig};
pub use crypto::{CryptoProvider, MeshCrypto};
pub use error::{CoreError, CoreResult};
pub use store::{BlobStore, ItemStore, SqliteBlobStore, SqliteItemStore};
pub use transport::{MemoryHub, MemoryTransport, Transport};
pub use types::{now_ms, random_token, ContentId, IdentityId, MeshAddress, PacketId};
