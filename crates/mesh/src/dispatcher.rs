//! Packet dispatcher: dedup, boot queue, parking, and routing.
//!
//! Single point of entry for inbound packets. Order of operations:
//! packets arriving before local state loads are queued and replayed;
//! then the trust gate rules; then deduplication by packet id — the
//! idempotency primitive the whole gossip design depends on; then
//! liveness refresh; then mailbox parking for absent identities; then
//! one exhaustive match routing to the handler for the packet's kind.

use crate::engine::MeshEngine;
use crate::firewall::{self, Admission};
use crate::packet::{Packet, Payload};
use std::collections::{HashSet, VecDeque};
use tracing::debug;
use veilmesh_core::{MeshAddress, PacketId};

/// Bounded set of recently seen packet ids, FIFO-evicted.
#[derive(Debug)]
pub struct SeenIds {
    set: HashSet<PacketId>,
    order: VecDeque<PacketId>,
    cap: usize,
}

impl SeenIds {
    pub fn new(cap: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            cap,
        }
    }

    /// Record an id. Returns true when it was not seen before.
    pub fn insert(&mut self, id: PacketId) -> bool {
        if self.set.contains(&id) {
            return false;
        }
        self.set.insert(id.clone());
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &PacketId) -> bool {
        self.set.contains(id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl MeshEngine {
    /// Entry point for raw transport deliveries.
    pub fn handle_raw(&mut self, bytes: &[u8], sender: MeshAddress, now: u64) {
        match Packet::from_bytes(bytes) {
            Ok(packet) => self.handle_packet(packet, sender, false, now),
            Err(e) => debug!(from = %sender.short(), error = %e, "undecodable packet dropped"),
        }
    }

    /// Dispatch one packet to completion.
    pub fn handle_packet(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        is_replay: bool,
        now: u64,
    ) {
        // Admission needs loaded trust state, so queueing comes first
        if !self.ready {
            self.boot_queue.push_back((packet, sender));
            return;
        }

        if firewall::admit(&self.peers, &packet, &sender) != Admission::Deliver {
            return;
        }

        // Any admitted packet except a sign-off proves the sender is
        // alive, even one that dedup is about to discard
        if packet.payload.refreshes_liveness() {
            let came_online = self.peers.mark_online(&sender, now);
            if came_online {
                self.on_peer_online(sender.clone(), now);
            }
        }

        if !self.seen.insert(packet.id.clone()) {
            debug!(id = %packet.id, "duplicate packet discarded");
            return;
        }

        // Mailbox semantics: hold packets for identities we host routes
        // for but who are not this node
        if let Some(target) = packet.target.clone() {
            if target != *self.identity() {
                self.park_for(target, packet);
                return;
            }
        }

        self.route(packet, sender, is_replay, now);
    }

    /// Exhaustive routing over every packet kind.
    pub(crate) fn route(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        is_replay: bool,
        now: u64,
    ) {
        match packet.payload.clone() {
            Payload::PresenceAnnounce { identity, alias, address } => {
                self.on_presence_announce(packet, sender, identity, alias, address, now)
            }
            Payload::PresenceGoodbye { identity } => {
                self.on_presence_goodbye(packet, sender, identity)
            }
            Payload::ShutdownNotice { identity } => {
                self.on_shutdown_notice(packet, sender, identity)
            }
            Payload::ShutdownAck => self.on_shutdown_ack(sender),
            Payload::ConnectionRequest {
                identity,
                alias,
                public_key,
                exchange_key,
                address,
                message,
                sent_at,
                signature,
            } => self.on_connection_request(
                sender, identity, alias, public_key, exchange_key, address, message, sent_at,
                signature, is_replay, now,
            ),
            Payload::ConnectionAccept {
                identity,
                alias,
                public_key,
                exchange_key,
                address,
            } => self.on_connection_accept(
                sender, identity, alias, public_key, exchange_key, address, is_replay, now,
            ),
            Payload::DirectMessage { message_id, from, sealed, sent_at } => {
                self.on_direct_message(message_id, from, sealed, sent_at, is_replay)
            }
            Payload::TypingIndicator { from, typing } => self.on_typing(from, typing, is_replay),
            Payload::ContentAnnounce {
                content_id,
                content_hash,
                ..
            } => self.on_content_announce(packet, sender, content_id, content_hash),
            Payload::ContentFetch { content_id } => self.on_content_fetch(sender, content_id),
            Payload::ContentData { post } => self.on_content_data(post, sender, is_replay),
            Payload::ContentEdit {
                content_id,
                author,
                content,
                edited_at,
                signature,
            } => self.on_content_edit(
                packet, sender, content_id, author, content, edited_at, signature, is_replay,
            ),
            Payload::ContentDelete {
                content_id,
                author,
                deleted_at,
                signature,
            } => self.on_content_delete(
                packet, sender, content_id, author, deleted_at, signature, is_replay,
            ),
            Payload::PostVote { content_id, voter, dir } => {
                self.on_post_vote(packet, sender, content_id, voter, dir)
            }
            Payload::CommentVote {
                content_id,
                comment_id,
                voter,
                dir,
            } => self.on_comment_vote(packet, sender, content_id, comment_id, voter, dir),
            Payload::PostReaction {
                content_id,
                emoji,
                voter,
                active,
            } => self.on_post_reaction(packet, sender, content_id, emoji, voter, active),
            Payload::CommentReaction {
                content_id,
                comment_id,
                emoji,
                voter,
                active,
            } => self.on_comment_reaction(
                packet, sender, content_id, comment_id, emoji, voter, active,
            ),
            Payload::CommentAdd {
                content_id,
                parent_id,
                comment,
            } => self.on_comment_add(packet, sender, content_id, parent_id, comment, is_replay),
            Payload::InventoryRequest {
                digest,
                want_profile,
                want_peers,
            } => self.on_inventory_request(sender, digest, want_profile, want_peers),
            Payload::InventoryResponse {
                posts,
                profile,
                known_peers,
            } => self.on_inventory_response(posts, profile, known_peers, sender, is_replay, now),
            Payload::GroupInvite { group, from } => {
                self.on_group_invite(group, from, is_replay)
            }
            Payload::GroupUpdate { group } => self.on_group_update(packet, sender, group),
            Payload::GroupQuery { group_id } => self.on_group_query(sender, group_id),
            Payload::GroupSync { groups } => self.on_group_sync(groups),
            Payload::GroupDelete { group_id, owner } => {
                self.on_group_delete(packet, sender, group_id, owner)
            }
            Payload::ChunkRequest {
                content_id,
                index,
                chunk_size,
                access_key,
            } => self.on_chunk_request(sender, content_id, index, chunk_size, access_key),
            Payload::ChunkResponse {
                content_id,
                index,
                total,
                data,
            } => self.on_chunk_response(sender, content_id, index, total, data, now),
            Payload::RelayRequest {
                content_id,
                origin_hint,
                owner,
                access_key,
                meta,
            } => self.on_relay_request(
                sender, content_id, origin_hint, owner, access_key, meta, now,
            ),
            Payload::RecoveryFound { content_id, source } => {
                self.on_recovery_found(content_id, source, now)
            }
        }
    }
}
