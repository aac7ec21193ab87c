//! Trust gate: every inbound packet passes here first.
//!
//! A packet is admitted only if its immediate sender is trusted, or the
//! payload kind is on the small allow-list that must be reachable from
//! untrusted senders (signed handshakes, capability-gated media chunks).
//! Everything else is dropped silently — no reply, so scanners learn
//! nothing about this node's existence.

use crate::packet::Packet;
use crate::peer::PeerDirectory;
use tracing::debug;
use veilmesh_core::MeshAddress;

/// Verdict of the trust gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Route to a handler.
    Deliver,
    /// Untrusted sender on a gated kind; drop silently.
    DropUntrusted,
    /// Sender is explicitly blocked; drop everything.
    DropBlocked,
}

/// Decide whether a packet from `sender` may reach the dispatcher.
pub fn admit(directory: &PeerDirectory, packet: &Packet, sender: &MeshAddress) -> Admission {
    if directory.is_blocked(sender) {
        debug!(from = %sender.short(), kind = packet.payload.kind_name(), "dropped: blocked sender");
        return Admission::DropBlocked;
    }
    if directory.is_trusted(sender) || packet.payload.allowed_untrusted() {
        return Admission::Deliver;
    }
    debug!(from = %sender.short(), kind = packet.payload.kind_name(), "dropped: untrusted sender");
    Admission::DropUntrusted
}
