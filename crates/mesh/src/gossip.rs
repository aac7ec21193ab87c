//! Daisy-chain gossip propagation.
//!
//! Forwards eligible packets to a bounded, randomized subset of trusted
//! peers. The forwarded copy decrements the hop budget, rewrites the
//! link sender to this node, and strips origin hints from the payload —
//! a recipient can only ever treat the immediate sender as a carrier.

use crate::packet::Packet;
use crate::peer::{Connectivity, PeerDirectory};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use veilmesh_core::MeshAddress;

/// Jitter bounds for forwarded packets (ms), avoiding synchronized
/// bursts across the mesh.
const MIN_DELAY_MS: u64 = 150;
const MAX_DELAY_MS: u64 = 650;

/// One outbound transmission the engine's outbox owes the transport.
#[derive(Debug, Clone)]
pub struct Departure {
    pub target: MeshAddress,
    pub packet: Packet,
    pub delay_ms: u64,
}

/// Plan the forward fan-out for a packet.
///
/// Returns an empty plan when the packet kind does not spread, the hop
/// budget is spent, or no eligible peer remains. Candidates exclude the
/// direct sender, the packet's declared link sender, and this node —
/// the no-echo rule. Online peers are preferred; offline trusted peers
/// backfill remaining slots (they may have just come back).
pub fn propagate(
    packet: &Packet,
    direct_sender: Option<&MeshAddress>,
    directory: &PeerDirectory,
    self_address: &MeshAddress,
    fanout: usize,
    rng: &mut StdRng,
) -> Vec<Departure> {
    if !packet.payload.is_gossip() || packet.hop_budget == 0 {
        return Vec::new();
    }

    let mut forwarded = packet.clone();
    forwarded.hop_budget -= 1;
    forwarded.payload.strip_origin();
    forwarded.sender = self_address.clone();

    let excluded = |address: &MeshAddress| {
        Some(address) == direct_sender || *address == packet.sender || address == self_address
    };

    let mut online: Vec<MeshAddress> = Vec::new();
    let mut offline: Vec<MeshAddress> = Vec::new();
    for peer in directory.trusted() {
        if excluded(&peer.address) {
            continue;
        }
        match peer.connectivity {
            Connectivity::Online => online.push(peer.address.clone()),
            Connectivity::Offline => offline.push(peer.address.clone()),
        }
    }

    online.shuffle(rng);
    offline.shuffle(rng);

    let mut targets = online;
    targets.truncate(fanout);
    for address in offline {
        if targets.len() >= fanout {
            break;
        }
        targets.push(address);
    }

    targets
        .into_iter()
        .map(|target| Departure {
            target,
            packet: forwarded.clone(),
            delay_ms: rng.gen_range(MIN_DELAY_MS..MAX_DELAY_MS),
        })
        .collect()
}
