//! Per-kind packet handlers.
//!
//! Each handler validates authenticity where it matters, applies the
//! mutation, persists, re-broadcasts when the mutation must spread, and
//! notifies the user when the mutation is new and not self-caused.
//! Authenticity failures never mutate state; they are logged and dropped.

use crate::engine::{delete_signing_bytes, merge_into, MeshEngine, Notification};
use crate::inventory;
use crate::packet::{connection_signing_bytes, DigestEntry, Packet, Payload};
use crate::peer::TrustClass;
use tracing::{debug, info, warn};
use veilmesh_core::{ContentId, IdentityId, MeshAddress};
use veilmesh_domain::{
    insert_reply, merge_groups, update_node, ChatMessage, Comment, Group, MediaMeta, Post,
    Profile, Visibility, VoteDir,
};
use veilmesh_transfer::{DownloadStart, Listener};

/// Peer-exchange lists are capped at this many addresses.
const PEER_EXCHANGE_CAP: usize = 8;

impl MeshEngine {
    // ---- presence --------------------------------------------------------

    pub(crate) fn on_presence_announce(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        identity: IdentityId,
        alias: String,
        address: Option<MeshAddress>,
        now: u64,
    ) {
        // The origin hint is only believed when the announce came
        // straight from the origin; relayed copies have it stripped.
        if address.as_ref() == Some(&sender) {
            let peer = self.peers.upsert_discovered(sender.clone(), now);
            peer.identity = Some(identity.clone());
            if peer.alias.is_empty() {
                peer.alias = alias;
            }
            self.persist_peers();
            self.deliver_parked(&identity, &sender);
        }
        self.gossip_onward(&packet, Some(&sender));
    }

    pub(crate) fn on_presence_goodbye(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        identity: IdentityId,
    ) {
        debug!(identity = %identity, "peer signed off");
        self.peers.mark_offline(&sender);
        self.gossip_onward(&packet, Some(&sender));
    }

    pub(crate) fn on_shutdown_notice(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        identity: IdentityId,
    ) {
        info!(identity = %identity, "peer shutting down");
        self.peers.mark_offline(&sender);
        self.queue_payload(sender.clone(), Payload::ShutdownAck);
        self.gossip_onward(&packet, Some(&sender));
    }

    pub(crate) fn on_shutdown_ack(&mut self, sender: MeshAddress) {
        debug!(from = %sender.short(), "shutdown acknowledged");
    }

    // ---- handshake -------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_connection_request(
        &mut self,
        sender: MeshAddress,
        identity: IdentityId,
        alias: String,
        public_key: String,
        exchange_key: String,
        address: MeshAddress,
        _message: String,
        sent_at: u64,
        signature: String,
        is_replay: bool,
        now: u64,
    ) {
        // Strict enforcement: unsigned or mis-signed requests change no
        // state at all. The identity must be the key it claims.
        if identity.0 != public_key {
            warn!(from = %sender.short(), "connection request identity/key mismatch");
            return;
        }
        let (Ok(pub_bytes), Ok(sig_bytes)) = (hex::decode(&public_key), hex::decode(&signature))
        else {
            warn!(from = %sender.short(), "malformed connection request");
            return;
        };
        let payload =
            connection_signing_bytes(&identity, &public_key, &exchange_key, &address, sent_at);
        if !self.crypto.verify(&payload, &sig_bytes, &pub_bytes) {
            warn!(from = %sender.short(), identity = %identity, "rejected forged connection request");
            return;
        }

        let already_trusted = self.peers.is_trusted(&address);
        let peer = self.peers.upsert_discovered(address.clone(), now);
        if peer.trust == TrustClass::Blocked {
            return;
        }
        if peer.trust != TrustClass::Trusted {
            peer.trust = TrustClass::Pending;
        }
        peer.identity = Some(identity.clone());
        peer.alias = alias.clone();
        peer.public_key = Some(public_key);
        peer.exchange_key = Some(exchange_key);
        peer.last_seen = now;
        self.persist_peers();

        if already_trusted {
            // We reached out first; their request completes the handshake
            let _ = self.accept_connection(&address.clone(), now);
        } else if !is_replay {
            self.notify(Notification::ConnectionRequested {
                identity,
                alias,
                address,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_connection_accept(
        &mut self,
        sender: MeshAddress,
        identity: IdentityId,
        alias: String,
        public_key: String,
        exchange_key: String,
        address: MeshAddress,
        is_replay: bool,
        now: u64,
    ) {
        // Only meaningful if we asked first (the address is trusted)
        if !self.peers.is_trusted(&sender) && !self.peers.is_trusted(&address) {
            debug!(from = %sender.short(), "unsolicited connection accept ignored");
            return;
        }
        if identity.0 != public_key {
            warn!(from = %sender.short(), "connection accept identity/key mismatch");
            return;
        }

        let peer = self.peers.upsert_discovered(sender.clone(), now);
        peer.identity = Some(identity.clone());
        peer.alias = alias;
        peer.public_key = Some(public_key);
        peer.exchange_key = Some(exchange_key);
        peer.trust = TrustClass::Trusted;
        peer.last_seen = now;
        self.persist_peers();
        self.deliver_parked(&identity, &sender);

        if !is_replay {
            self.notify(Notification::ConnectionAccepted {
                identity,
                address: sender,
            });
        }
    }

    // ---- messaging -------------------------------------------------------

    pub(crate) fn on_direct_message(
        &mut self,
        message_id: String,
        from: IdentityId,
        sealed: String,
        sent_at: u64,
        is_replay: bool,
    ) {
        if self.messages.contains_key(&message_id) {
            return;
        }
        let Ok(sealed_bytes) = hex::decode(&sealed) else {
            debug!(from = %from, "malformed direct message payload");
            return;
        };
        let plain = match self.crypto.decrypt(&sealed_bytes) {
            Ok(plain) => plain,
            Err(e) => {
                warn!(from = %from, error = %e, "direct message failed to decrypt");
                return;
            }
        };

        let message = ChatMessage {
            id: message_id.clone(),
            from: from.clone(),
            to: self.identity.clone(),
            body: String::from_utf8_lossy(&plain).into_owned(),
            sent_at,
            read: false,
        };
        self.messages.insert(message_id.clone(), message.clone());
        self.persist_message(&message);

        if !is_replay {
            self.notify(Notification::MessageReceived { message_id, from });
        }
    }

    pub(crate) fn on_typing(&mut self, from: IdentityId, typing: bool, is_replay: bool) {
        if !is_replay {
            self.notify(Notification::Typing { from, typing });
        }
    }

    // ---- content ---------------------------------------------------------

    pub(crate) fn on_content_announce(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        content_hash: String,
    ) {
        match self.posts.get(&content_id) {
            Some(post) if post.content_hash == content_hash => {
                // Replica already current: keep the announce spreading
                self.gossip_onward(&packet, Some(&sender));
            }
            _ => {
                // Missing or stale: pull from the carrier; we announce
                // ourselves once the content is stored
                self.queue_payload(sender, Payload::ContentFetch { content_id });
            }
        }
    }

    pub(crate) fn on_content_fetch(&mut self, sender: MeshAddress, content_id: ContentId) {
        let Some(post) = self.posts.get(&content_id) else {
            return;
        };
        let visible = post.visibility == Visibility::Public || self.peers.is_trusted(&sender);
        if visible {
            let post = post.clone();
            self.queue_payload(sender, Payload::ContentData { post });
        }
    }

    pub(crate) fn on_content_data(&mut self, post: Post, _sender: MeshAddress, is_replay: bool) {
        self.ingest_post(post, is_replay);
    }

    /// Signature-check, merge, persist, and re-announce one incoming
    /// replica. Shared by content-data and inventory-response paths.
    pub(crate) fn ingest_post(&mut self, incoming: Post, is_replay: bool) -> bool {
        if !self.verify_post(&incoming) {
            warn!(content = %incoming.id, author = %incoming.author, "rejected content with bad signature");
            return false;
        }

        match self.posts.get(&incoming.id) {
            Some(local) => {
                let Some(merged) = merge_into(local, &incoming) else {
                    return false;
                };
                let announce = self.announce_payload(&merged);
                self.persist_post(&merged);
                let id = merged.id.clone();
                self.posts.insert(id.clone(), merged);
                self.originate_gossip(announce);
                if !is_replay {
                    self.notify(Notification::PostUpdated { content_id: id });
                }
                true
            }
            None => {
                let mut post = incoming;
                // The embedded hash is derived state, never trusted
                post.refresh_hash();
                let announce = self.announce_payload(&post);
                self.persist_post(&post);
                let id = post.id.clone();
                let author = post.author.clone();
                self.posts.insert(id.clone(), post);
                self.originate_gossip(announce);
                if !is_replay && author != self.identity {
                    self.notify(Notification::PostReceived {
                        content_id: id,
                        author,
                    });
                }
                true
            }
        }
    }

    fn announce_payload(&self, post: &Post) -> Payload {
        Payload::ContentAnnounce {
            content_id: post.id.clone(),
            content_hash: post.content_hash.clone(),
            author: post.author.clone(),
            visibility: post.visibility,
            origin: None,
        }
    }

    /// Verify a post's embedded signature against its embedded key, and
    /// the author identity against that key.
    pub(crate) fn verify_post(&self, post: &Post) -> bool {
        if post.author.0 != post.author_public_key {
            return false;
        }
        let (Ok(pub_bytes), Ok(sig_bytes)) = (
            hex::decode(&post.author_public_key),
            hex::decode(&post.signature),
        ) else {
            return false;
        };
        self.crypto.verify(&post.signing_bytes(), &sig_bytes, &pub_bytes)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_content_edit(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        author: IdentityId,
        content: String,
        edited_at: u64,
        signature: String,
        is_replay: bool,
    ) {
        let Some(local) = self.posts.get(&content_id) else {
            // Can't verify an edit for content we never saw: pull it
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        if local.author != author {
            warn!(content = %content_id, "edit author does not match stored author");
            return;
        }

        let mut candidate = local.clone();
        candidate.content = content;
        candidate.edited_at = Some(edited_at);
        candidate.signature = signature;
        if !self.verify_post(&candidate) {
            warn!(content = %content_id, "rejected edit with bad signature");
            return;
        }

        let local = self.posts.get(&content_id).expect("post exists");
        if let Some(merged) = merge_into(local, &candidate) {
            self.persist_post(&merged);
            self.posts.insert(content_id.clone(), merged);
            if !is_replay {
                self.notify(Notification::PostUpdated {
                    content_id: content_id.clone(),
                });
            }
        }
        self.gossip_onward(&packet, Some(&sender));
    }

    pub(crate) fn on_content_delete(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        author: IdentityId,
        deleted_at: u64,
        signature: String,
        is_replay: bool,
    ) {
        let Some(local) = self.posts.get(&content_id) else {
            return;
        };
        if local.author != author {
            warn!(content = %content_id, "delete author does not match stored author");
            return;
        }
        let (Ok(pub_bytes), Ok(sig_bytes)) = (
            hex::decode(&local.author_public_key),
            hex::decode(&signature),
        ) else {
            return;
        };
        let payload = delete_signing_bytes(&content_id, &author, deleted_at);
        if !self.crypto.verify(&payload, &sig_bytes, &pub_bytes) {
            warn!(content = %content_id, "rejected deletion with bad signature");
            return;
        }

        let removed = self.posts.remove(&content_id);
        if let Err(e) = self.items.delete("posts", &content_id.0) {
            warn!(content = %content_id, error = %e, "failed to delete persisted post");
        }
        if let Some(media) = removed.and_then(|p| p.media) {
            let _ = self.blobs.delete(&media.id.0);
        }
        if !is_replay {
            self.notify(Notification::PostDeleted {
                content_id: content_id.clone(),
            });
        }
        self.gossip_onward(&packet, Some(&sender));
    }

    // ---- votes, reactions, comments -------------------------------------

    pub(crate) fn on_post_vote(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        voter: IdentityId,
        dir: VoteDir,
    ) {
        let Some(post) = self.posts.get_mut(&content_id) else {
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        if post.cast_vote(voter, dir) {
            let post = post.clone();
            self.persist_post(&post);
            self.gossip_onward(&packet, Some(&sender));
        }
    }

    pub(crate) fn on_comment_vote(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        comment_id: String,
        voter: IdentityId,
        dir: VoteDir,
    ) {
        let Some(post) = self.posts.get_mut(&content_id) else {
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        let mut changed = false;
        update_node(&mut post.comments, &comment_id, |c| {
            changed = c.cast_vote(voter.clone(), dir);
        });
        if changed {
            post.refresh_hash();
            let post = post.clone();
            self.persist_post(&post);
            self.gossip_onward(&packet, Some(&sender));
        }
    }

    pub(crate) fn on_post_reaction(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        emoji: String,
        voter: IdentityId,
        active: bool,
    ) {
        let Some(post) = self.posts.get_mut(&content_id) else {
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        if post.set_reaction(&emoji, voter, active) {
            let post = post.clone();
            self.persist_post(&post);
            self.gossip_onward(&packet, Some(&sender));
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_comment_reaction(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        comment_id: String,
        emoji: String,
        voter: IdentityId,
        active: bool,
    ) {
        let Some(post) = self.posts.get_mut(&content_id) else {
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        let mut changed = false;
        update_node(&mut post.comments, &comment_id, |c| {
            changed = c.set_reaction(&emoji, voter.clone(), active);
        });
        if changed {
            post.refresh_hash();
            let post = post.clone();
            self.persist_post(&post);
            self.gossip_onward(&packet, Some(&sender));
        }
    }

    pub(crate) fn on_comment_add(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        content_id: ContentId,
        parent_id: Option<String>,
        comment: Comment,
        is_replay: bool,
    ) {
        let Some(post) = self.posts.get_mut(&content_id) else {
            self.queue_payload(sender, Payload::ContentFetch { content_id });
            return;
        };
        let comment_id = comment.id.clone();
        let author = comment.author.clone();
        if insert_reply(&mut post.comments, parent_id.as_deref(), comment) {
            post.refresh_hash();
            let post = post.clone();
            self.persist_post(&post);
            self.gossip_onward(&packet, Some(&sender));
            if !is_replay && author != self.identity {
                self.notify(Notification::CommentReceived {
                    content_id,
                    comment_id,
                    author,
                });
            }
        }
    }

    // ---- inventory sync --------------------------------------------------

    pub(crate) fn on_inventory_request(
        &mut self,
        sender: MeshAddress,
        digest: Vec<DigestEntry>,
        want_profile: bool,
        want_peers: bool,
    ) {
        let requester_connected = self.peers.is_trusted(&sender);
        let posts = inventory::select_updates(&self.posts, &digest, requester_connected);

        let profile = want_profile.then(|| self.own_profile());
        let known_peers: Vec<MeshAddress> = if want_peers {
            self.peers
                .discovered_addresses()
                .into_iter()
                .filter(|a| *a != sender)
                .take(PEER_EXCHANGE_CAP)
                .collect()
        } else {
            Vec::new()
        };

        if posts.is_empty() && profile.is_none() && known_peers.is_empty() {
            return;
        }
        debug!(to = %sender.short(), updates = posts.len(), "answering inventory digest");
        self.queue_payload(
            sender,
            Payload::InventoryResponse {
                posts,
                profile,
                known_peers,
            },
        );
    }

    pub(crate) fn on_inventory_response(
        &mut self,
        posts: Vec<Post>,
        profile: Option<Profile>,
        known_peers: Vec<MeshAddress>,
        sender: MeshAddress,
        is_replay: bool,
        now: u64,
    ) {
        for post in posts {
            self.ingest_post(post, is_replay);
        }

        if let Some(profile) = profile {
            // Keep the contact's cached profile fresh
            let expected = self
                .peers
                .get(&sender)
                .and_then(|p| p.identity.clone());
            if expected.as_ref() == Some(&profile.identity) || expected.is_none() {
                self.persist_profile(&profile);
                self.profiles.insert(profile.identity.clone(), profile);
            }
        }

        for address in known_peers {
            if address != self.address() {
                self.peers.upsert_discovered(address, now);
            }
        }
    }

    fn own_profile(&self) -> Profile {
        let stored = self.profiles.get(&self.identity);
        Profile {
            identity: self.identity.clone(),
            display_name: self.alias.clone(),
            bio: stored.map(|p| p.bio.clone()).unwrap_or_default(),
            public_key: hex::encode(self.crypto.public_key()),
            exchange_key: hex::encode(self.crypto.exchange_key()),
            avatar: stored.and_then(|p| p.avatar.clone()),
        }
    }

    // ---- groups ----------------------------------------------------------

    pub(crate) fn on_group_invite(&mut self, group: Group, from: IdentityId, is_replay: bool) {
        if !group.members.contains(&self.identity) {
            return;
        }
        let group_id = group.id.clone();
        self.persist_group(&group);
        self.groups.insert(group_id.clone(), group);
        if !is_replay {
            self.notify(Notification::GroupInvited { group_id, from });
        }
    }

    pub(crate) fn on_group_update(&mut self, packet: Packet, sender: MeshAddress, group: Group) {
        match self.groups.get(&group.id) {
            Some(local) => {
                let merged = merge_groups(local, &group);
                if merged != *local {
                    self.persist_group(&merged);
                    self.groups.insert(merged.id.clone(), merged);
                }
            }
            None if group.members.contains(&self.identity) => {
                self.persist_group(&group);
                self.groups.insert(group.id.clone(), group);
            }
            None => {}
        }
        self.gossip_onward(&packet, Some(&sender));
    }

    pub(crate) fn on_group_query(&mut self, sender: MeshAddress, group_id: ContentId) {
        if let Some(group) = self.groups.get(&group_id) {
            let groups = vec![group.clone()];
            self.queue_payload(sender, Payload::GroupSync { groups });
        }
    }

    pub(crate) fn on_group_sync(&mut self, groups: Vec<Group>) {
        for group in groups {
            match self.groups.get(&group.id) {
                Some(local) => {
                    let merged = merge_groups(local, &group);
                    if merged != *local {
                        self.persist_group(&merged);
                        self.groups.insert(merged.id.clone(), merged);
                    }
                }
                None if group.members.contains(&self.identity) => {
                    self.persist_group(&group);
                    self.groups.insert(group.id.clone(), group);
                }
                None => {}
            }
        }
    }

    pub(crate) fn on_group_delete(
        &mut self,
        packet: Packet,
        sender: MeshAddress,
        group_id: ContentId,
        owner: IdentityId,
    ) {
        let Some(local) = self.groups.get(&group_id) else {
            return;
        };
        if local.owner != owner {
            warn!(group = %group_id, "group delete from non-owner ignored");
            return;
        }
        self.groups.remove(&group_id);
        if let Err(e) = self.items.delete("groups", &group_id.0) {
            warn!(group = %group_id, error = %e, "failed to delete persisted group");
        }
        self.gossip_onward(&packet, Some(&sender));
    }

    // ---- media transfer --------------------------------------------------

    pub(crate) fn on_chunk_request(
        &mut self,
        sender: MeshAddress,
        content_id: ContentId,
        index: u32,
        chunk_size: u32,
        access_key: String,
    ) {
        // Bytes are released only against the per-object capability token
        if !self.blobs.verify_access(&content_id.0, &access_key) {
            debug!(from = %sender.short(), content = %content_id, "chunk request failed capability check");
            return;
        }
        let Ok(Some(bytes)) = self.blobs.get(&content_id.0) else {
            return;
        };
        let chunk_size = chunk_size as usize;
        if chunk_size == 0 {
            return;
        }
        let start = index as usize * chunk_size;
        if start >= bytes.len() {
            return;
        }
        let end = (start + chunk_size).min(bytes.len());
        let total = ((bytes.len() + chunk_size - 1) / chunk_size) as u32;

        self.queue_payload(
            sender,
            Payload::ChunkResponse {
                content_id,
                index,
                total,
                data: hex::encode(&bytes[start..end]),
            },
        );
    }

    pub(crate) fn on_chunk_response(
        &mut self,
        sender: MeshAddress,
        content_id: ContentId,
        index: u32,
        _total: u32,
        data: String,
        now: u64,
    ) {
        let Ok(bytes) = hex::decode(&data) else {
            debug!(content = %content_id, "undecodable chunk payload");
            return;
        };
        let events = self.transfers.on_chunk(&content_id, index, bytes, &sender, now);
        if let Some(rtt) = self.transfers.avg_rtt(&content_id) {
            self.peers.record_latency(&sender, rtt);
        }
        if let Some(progress) = self.transfers.progress(&content_id) {
            self.notify(Notification::TransferProgress {
                content_id: content_id.clone(),
                progress,
            });
        }
        self.apply_transfer_events(events, now);
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_relay_request(
        &mut self,
        sender: MeshAddress,
        content_id: ContentId,
        origin_hint: Option<MeshAddress>,
        owner: Option<IdentityId>,
        access_key: Option<String>,
        meta: Option<MediaMeta>,
        now: u64,
    ) {
        if self.relays.suppress(&content_id, &sender, now) {
            return;
        }

        // (a) We already hold the bytes: offer ourselves as source
        if self.blobs.has(&content_id.0) {
            let authorized = access_key
                .as_deref()
                .map(|token| self.blobs.verify_access(&content_id.0, token))
                .unwrap_or(false);
            if authorized {
                let source = self.address();
                self.queue_payload(sender, Payload::RecoveryFound { content_id, source });
            }
            return;
        }

        // (b) We can reach the true origin: proxy the download and offer
        // ourselves once it lands
        let resolved_origin = origin_hint
            .clone()
            .or_else(|| {
                owner
                    .as_ref()
                    .and_then(|o| self.peers.find_by_identity(o))
                    .map(|p| p.address.clone())
            })
            .filter(|addr| *addr != self.address() && *addr != sender);

        if let (Some(origin), Some(meta)) = (resolved_origin, meta.clone()) {
            debug!(content = %content_id, origin = %origin.short(), "starting proxy download for relay");
            let trusted = self.peers.is_trusted(&origin);
            let chunk_size = self.config.transfer.chunk_size;
            let start = self.transfers.begin(
                meta,
                Some(origin),
                trusted,
                true,
                Listener::RelayServe { requester: sender },
                chunk_size,
                now,
            );
            if let DownloadStart::Started { requests } = start {
                for request in requests {
                    self.send_chunk_request(request);
                }
            }
            return;
        }

        // (c) Nothing we can do directly: park the requester and spread
        // the request deeper into the mesh
        let first = self.relays.is_first_request(&content_id);
        self.relays
            .register(content_id.clone(), meta.clone(), sender.clone(), now);
        if first {
            self.broadcast_to_trusted(
                Payload::RelayRequest {
                    content_id,
                    origin_hint,
                    owner,
                    access_key,
                    meta,
                },
                Some(&sender),
            );
        }
    }

    pub(crate) fn on_recovery_found(
        &mut self,
        content_id: ContentId,
        source: MeshAddress,
        now: u64,
    ) {
        info!(content = %content_id, source = %source.short(), "recovery source found");
        let events = self.transfers.on_source_found(&content_id, source.clone(), now);
        self.apply_transfer_events(events, now);

        // Anyone we parked can fetch from the new source themselves
        for waiter in self.relays.take_waiters(&content_id) {
            self.queue_payload(
                waiter,
                Payload::RecoveryFound {
                    content_id: content_id.clone(),
                    source: source.clone(),
                },
            );
        }
    }
}
