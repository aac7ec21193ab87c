//! Veilmesh protocol engine.
//!
//! The mesh layer of the veilmesh social network: every inbound packet
//! passes the trust gate, is deduplicated by the dispatcher, and is
//! routed to a handler that mutates local content/peer/session state —
//! possibly re-broadcasting through the gossip propagator, requesting
//! missing content through the inventory synchronizer, or advancing a
//! media transfer.
//!
//! # Core Components
//!
//! - **Peer directory & trust gate**: known/trusted/blocked peers,
//!   liveness, firewall admission
//! - **Packet dispatcher**: dedup, boot queue, mailbox parking,
//!   exhaustive routing over every packet kind
//! - **Gossip propagator**: bounded randomized fan-out with hop budgets
//!   and origin stripping
//! - **Inventory synchronizer**: periodic digest reconciliation
//! - **Engine**: the single-writer state container tying it together
//!
//! # Concurrency
//!
//! The engine processes one event at a time to completion; handlers are
//! synchronous over `&mut MeshEngine`, so the merge and dedup invariants
//! need no locks. The tokio runtime loop in [`runtime`] feeds it inbound
//! packets and timer ticks and drains its outbox after every event.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod firewall;
pub mod gossip;
mod handlers;
pub mod inventory;
pub mod packet;
pub mod peer;
pub mod runtime;

pub use dispatcher::SeenIds;
pub use engine::{MeshEngine, NodeStatus, Notification};
pub use error::{MeshError, MeshResult};
pub use firewall::{admit, Admission};
pub use gossip::Departure;
pub use packet::{connection_signing_bytes, DigestEntry, Packet, Payload};
pub use peer::{Connectivity, Peer, PeerDirectory, TrustClass};
pub use runtime::{EngineEvent, MeshRuntime};
