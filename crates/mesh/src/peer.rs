//! Peer directory: trust classes, liveness, and identity bindings.
//!
//! An address appears in exactly one trust class at a time (the map is
//! keyed by address). Trust is granted manually — adding a contact or
//! accepting a connection — never inferred from traffic.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use veilmesh_core::{IdentityId, MeshAddress};

/// Local classification of a peer address, governing firewall admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustClass {
    /// Explicitly added contact or manual connection.
    Trusted,
    /// Learned about through the mesh; never auto-promoted.
    Discovered,
    /// Asked to connect; awaiting a local decision.
    Pending,
    /// Explicitly rejected; dropped at the gate.
    Blocked,
}

/// Reachability state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    Online,
    Offline,
}

/// Everything known about one peer address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub address: MeshAddress,
    pub alias: String,
    pub identity: Option<IdentityId>,
    /// Hex-encoded public signing key, when known.
    pub public_key: Option<String>,
    /// Hex-encoded public exchange key, when known.
    pub exchange_key: Option<String>,
    pub trust: TrustClass,
    pub connectivity: Connectivity,
    pub last_seen: u64,
    pub latency_ms: Option<u64>,
}

impl Peer {
    fn discovered(address: MeshAddress, now: u64) -> Self {
        Self {
            address,
            alias: String::new(),
            identity: None,
            public_key: None,
            exchange_key: None,
            trust: TrustClass::Discovered,
            connectivity: Connectivity::Offline,
            last_seen: now,
            latency_ms: None,
        }
    }
}

/// The set of known peers and the liveness rules over them.
#[derive(Debug)]
pub struct PeerDirectory {
    peers: HashMap<MeshAddress, Peer>,
    /// Online peers silent for longer than this are demoted (ms).
    stale_after_ms: u64,
}

impl PeerDirectory {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            peers: HashMap::new(),
            stale_after_ms,
        }
    }

    /// Record a newly learned address without granting any trust.
    pub fn upsert_discovered(&mut self, address: MeshAddress, now: u64) -> &mut Peer {
        self.peers
            .entry(address.clone())
            .or_insert_with(|| Peer::discovered(address, now))
    }

    /// Explicitly grant trust to an address, creating it if needed.
    pub fn add_trusted(&mut self, address: MeshAddress, alias: String, now: u64) -> &mut Peer {
        let peer = self.upsert_discovered(address, now);
        peer.trust = TrustClass::Trusted;
        if !alias.is_empty() {
            peer.alias = alias;
        }
        peer
    }

    /// Move an address into the given trust class.
    pub fn set_trust(&mut self, address: &MeshAddress, trust: TrustClass) -> bool {
        match self.peers.get_mut(address) {
            Some(peer) => {
                peer.trust = trust;
                true
            }
            None => false,
        }
    }

    /// Drop a peer entirely.
    pub fn remove(&mut self, address: &MeshAddress) -> Option<Peer> {
        self.peers.remove(address)
    }

    pub fn get(&self, address: &MeshAddress) -> Option<&Peer> {
        self.peers.get(address)
    }

    pub fn get_mut(&mut self, address: &MeshAddress) -> Option<&mut Peer> {
        self.peers.get_mut(address)
    }

    pub fn is_trusted(&self, address: &MeshAddress) -> bool {
        matches!(self.get(address), Some(p) if p.trust == TrustClass::Trusted)
    }

    pub fn is_blocked(&self, address: &MeshAddress) -> bool {
        matches!(self.get(address), Some(p) if p.trust == TrustClass::Blocked)
    }

    /// Refresh liveness for an address, creating a discovered entry for
    /// previously unknown senders. Returns true on an offline→online
    /// transition.
    pub fn mark_online(&mut self, address: &MeshAddress, now: u64) -> bool {
        let peer = self.upsert_discovered(address.clone(), now);
        peer.last_seen = now;
        let came_online = peer.connectivity == Connectivity::Offline;
        peer.connectivity = Connectivity::Online;
        came_online
    }

    /// Explicitly mark a peer offline (goodbye/shutdown notices).
    pub fn mark_offline(&mut self, address: &MeshAddress) {
        if let Some(peer) = self.peers.get_mut(address) {
            peer.connectivity = Connectivity::Offline;
        }
    }

    /// Record a latency estimate for a peer.
    pub fn record_latency(&mut self, address: &MeshAddress, latency_ms: u64) {
        if let Some(peer) = self.peers.get_mut(address) {
            peer.latency_ms = Some(latency_ms);
        }
    }

    /// Demote online peers that have been silent past the stale window.
    /// Returns the demoted addresses.
    pub fn sweep_stale(&mut self, now: u64) -> Vec<MeshAddress> {
        let mut demoted = Vec::new();
        for peer in self.peers.values_mut() {
            if peer.connectivity == Connectivity::Online
                && now.saturating_sub(peer.last_seen) >= self.stale_after_ms
            {
                peer.connectivity = Connectivity::Offline;
                demoted.push(peer.address.clone());
            }
        }
        demoted
    }

    /// Every trusted peer.
    pub fn trusted(&self) -> Vec<&Peer> {
        self.peers
            .values()
            .filter(|p| p.trust == TrustClass::Trusted)
            .collect()
    }

    /// Addresses of every trusted peer.
    pub fn trusted_addresses(&self) -> Vec<MeshAddress> {
        self.trusted().into_iter().map(|p| p.address.clone()).collect()
    }

    /// Addresses of discovered (unconnected) peers, for peer exchange.
    pub fn discovered_addresses(&self) -> Vec<MeshAddress> {
        self.peers
            .values()
            .filter(|p| p.trust == TrustClass::Discovered)
            .map(|p| p.address.clone())
            .collect()
    }

    /// Resolve an identity to its home address, if known.
    pub fn find_by_identity(&self, identity: &IdentityId) -> Option<&Peer> {
        self.peers
            .values()
            .find(|p| p.identity.as_ref() == Some(identity))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn online_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.connectivity == Connectivity::Online)
            .count()
    }

    /// All peers, for persistence.
    pub fn all(&self) -> Vec<&Peer> {
        self.peers.values().collect()
    }

    /// Restore a persisted peer record.
    pub fn restore(&mut self, peer: Peer) {
        self.peers.insert(peer.address.clone(), peer);
    }
}
