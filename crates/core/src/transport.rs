//! Transport collaborator contract.
//!
//! The anonymity network is consumed as an opaque service: it assigns this
//! node a rendezvous address and delivers opaque byte packets to named
//! addresses, best-effort, unordered, with no delivery guarantee. The
//! engine never sees anything below that surface.

use crate::types::MeshAddress;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Outbound half of the anonymity-network transport.
pub trait Transport: Send + Sync {
    /// The rendezvous address assigned to this node.
    fn local_address(&self) -> MeshAddress;

    /// Hand a packet to the network. Returns false when the transport
    /// refused it outright; true means accepted, not delivered.
    fn send(&self, target: &MeshAddress, bytes: &[u8]) -> bool;
}

/// In-memory transport hub connecting multiple nodes in one process.
///
/// Used by the integration tests and by local single-process runs. Each
/// registered endpoint gets a mailbox; delivery is explicit via
/// [`MemoryHub::drain`], which keeps multi-node tests deterministic.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

#[derive(Debug, Default)]
struct HubInner {
    mailboxes: HashMap<MeshAddress, VecDeque<(MeshAddress, Vec<u8>)>>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint and return its transport handle.
    pub fn register(&self, label: &str) -> MemoryTransport {
        let address = MeshAddress(format!("mem-{label}"));
        self.inner
            .lock()
            .unwrap()
            .mailboxes
            .entry(address.clone())
            .or_default();
        MemoryTransport {
            address,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take every queued delivery for an address, in arrival order.
    pub fn drain(&self, address: &MeshAddress) -> Vec<(MeshAddress, Vec<u8>)> {
        let mut inner = self.inner.lock().unwrap();
        match inner.mailboxes.get_mut(address) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Whether any mailbox still holds undelivered packets.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.mailboxes.values().all(|q| q.is_empty())
    }

    /// Drop an endpoint; subsequent sends to it fail.
    pub fn disconnect(&self, address: &MeshAddress) {
        self.inner.lock().unwrap().mailboxes.remove(address);
    }
}

/// Per-node handle into a [`MemoryHub`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    address: MeshAddress,
    inner: Arc<Mutex<HubInner>>,
}

impl Transport for MemoryTransport {
    fn local_address(&self) -> MeshAddress {
        self.address.clone()
    }

    fn send(&self, target: &MeshAddress, bytes: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.mailboxes.get_mut(target) {
            Some(queue) => {
                queue.push_back((self.address.clone(), bytes.to_vec()));
                true
            }
            None => false,
        }
    }
}
