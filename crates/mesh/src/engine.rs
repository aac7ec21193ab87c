//! The mesh engine: single-writer state container for one node.
//!
//! Owns the peer directory, content replicas, transfer sessions, and
//! relay book-keeping, and exposes the local API surface (publish, vote,
//! comment, message, connect, download). Every mutation funnels through
//! `&mut self`, so handlers and timer ticks can never interleave.
//!
//! Outbound traffic is queued in an outbox of [`Departure`]s and drained
//! by the caller (the tokio runtime loop, or a test pump) after each
//! event; user-facing signals accumulate as [`Notification`]s the same
//! way.

use crate::dispatcher::SeenIds;
use crate::gossip::{self, Departure};
use crate::inventory;
use crate::packet::{connection_signing_bytes, Packet, Payload};
use crate::peer::{PeerDirectory, TrustClass};
use crate::error::{MeshError, MeshResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use veilmesh_core::{
    random_token, BlobStore, Config, ContentId, CryptoProvider, IdentityId, ItemStore,
    MeshAddress, Transport,
};
use veilmesh_domain::{
    merge_posts, ChatMessage, Comment, Group, MediaMeta, Post, Profile, Visibility, VoteDir,
};
use veilmesh_transfer::{
    ChunkRequest, DownloadStart, Listener, RelayCoordinator, TransferEvent, TransferManager,
};

/// Capacity of the seen-packet dedup window.
const SEEN_CAP: usize = 4096;

/// Parked packets kept per absent identity.
const PARKED_CAP: usize = 64;

/// User-facing signals produced by handlers. Replayed packets suppress
/// the ones that would re-notify (see dispatcher).
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PostReceived { content_id: ContentId, author: IdentityId },
    PostUpdated { content_id: ContentId },
    PostDeleted { content_id: ContentId },
    CommentReceived { content_id: ContentId, comment_id: String, author: IdentityId },
    MessageReceived { message_id: String, from: IdentityId },
    Typing { from: IdentityId, typing: bool },
    ConnectionRequested { identity: IdentityId, alias: String, address: MeshAddress },
    ConnectionAccepted { identity: IdentityId, address: MeshAddress },
    GroupInvited { group_id: ContentId, from: IdentityId },
    TransferProgress { content_id: ContentId, progress: f32 },
    TransferCompleted { content_id: ContentId, ticket: u64, size_bytes: usize },
    TransferFailed { content_id: ContentId, ticket: u64, reason: String },
}

/// Snapshot of the node's operational state.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub identity: IdentityId,
    pub alias: String,
    pub address: MeshAddress,
    pub ready: bool,
    pub peer_count: usize,
    pub online_peers: usize,
    pub post_count: usize,
    pub active_transfers: usize,
}

/// The protocol engine for one mesh node.
pub struct MeshEngine {
    pub(crate) config: Config,
    pub(crate) alias: String,
    pub(crate) identity: IdentityId,
    pub(crate) crypto: Arc<dyn CryptoProvider>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) items: Box<dyn ItemStore>,
    pub(crate) blobs: Box<dyn BlobStore>,
    pub(crate) peers: PeerDirectory,
    pub(crate) posts: HashMap<ContentId, Post>,
    pub(crate) groups: HashMap<ContentId, Group>,
    pub(crate) profiles: HashMap<IdentityId, Profile>,
    pub(crate) messages: HashMap<String, ChatMessage>,
    pub(crate) parked: HashMap<IdentityId, Vec<Packet>>,
    pub(crate) seen: SeenIds,
    pub(crate) boot_queue: VecDeque<(Packet, MeshAddress)>,
    pub(crate) ready: bool,
    pub(crate) transfers: TransferManager,
    pub(crate) relays: RelayCoordinator,
    pub(crate) outbox: Vec<Departure>,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) next_ticket: u64,
    pub(crate) rng: StdRng,
}

impl MeshEngine {
    /// Build an engine over its collaborators. The node's identity is
    /// derived from the crypto provider's public signing key. Call
    /// [`MeshEngine::load`] before feeding packets.
    pub fn new(
        config: Config,
        alias: String,
        crypto: Arc<dyn CryptoProvider>,
        transport: Arc<dyn Transport>,
        items: Box<dyn ItemStore>,
        blobs: Box<dyn BlobStore>,
    ) -> Self {
        let identity = IdentityId(hex::encode(crypto.public_key()));
        let stale_ms = config.mesh.peer_stale_secs * 1000;
        Self {
            config,
            alias,
            identity,
            crypto,
            transport,
            items,
            blobs,
            peers: PeerDirectory::new(stale_ms),
            posts: HashMap::new(),
            groups: HashMap::new(),
            profiles: HashMap::new(),
            messages: HashMap::new(),
            parked: HashMap::new(),
            seen: SeenIds::new(SEEN_CAP),
            boot_queue: VecDeque::new(),
            ready: false,
            transfers: TransferManager::new(),
            relays: RelayCoordinator::new(),
            outbox: Vec::new(),
            notifications: Vec::new(),
            next_ticket: 1,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reseed the gossip RNG (deterministic tests).
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn address(&self) -> MeshAddress {
        self.transport.local_address()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn post(&self, id: &ContentId) -> Option<&Post> {
        self.posts.get(id)
    }

    pub fn group(&self, id: &ContentId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub fn profile(&self, identity: &IdentityId) -> Option<&Profile> {
        self.profiles.get(identity)
    }

    pub fn messages(&self) -> Vec<&ChatMessage> {
        self.messages.values().collect()
    }

    pub fn media_bytes(&self, id: &ContentId) -> Option<Vec<u8>> {
        self.blobs.get(&id.0).ok().flatten()
    }

    /// Load persisted state and replay packets queued during boot.
    pub fn load(&mut self, now: u64) -> MeshResult<()> {
        let owner = self.identity.0.clone();

        for value in self.items.get_all("posts", &owner)? {
            if let Ok(post) = serde_json::from_value::<Post>(value) {
                self.posts.insert(post.id.clone(), post);
            }
        }
        for value in self.items.get_all("groups", &owner)? {
            if let Ok(group) = serde_json::from_value::<Group>(value) {
                self.groups.insert(group.id.clone(), group);
            }
        }
        for value in self.items.get_all("profiles", &owner)? {
            if let Ok(profile) = serde_json::from_value::<Profile>(value) {
                self.profiles.insert(profile.identity.clone(), profile);
            }
        }
        for value in self.items.get_all("messages", &owner)? {
            if let Ok(message) = serde_json::from_value::<ChatMessage>(value) {
                self.messages.insert(message.id.clone(), message);
            }
        }
        for value in self.items.get_all("peers", &owner)? {
            if let Ok(peer) = serde_json::from_value::<crate::peer::Peer>(value) {
                self.peers.restore(peer);
            }
        }

        self.ready = true;
        info!(
            posts = self.posts.len(),
            peers = self.peers.peer_count(),
            "local state loaded, replaying boot queue"
        );

        let queued: Vec<(Packet, MeshAddress)> = self.boot_queue.drain(..).collect();
        for (packet, sender) in queued {
            self.handle_packet(packet, sender, true, now);
        }
        Ok(())
    }

    // ---- persistence -----------------------------------------------------

    pub(crate) fn persist_post(&mut self, post: &Post) {
        let owner = self.identity.0.clone();
        if let Ok(value) = serde_json::to_value(post) {
            if let Err(e) = self.items.save("posts", &post.id.0, &value, &owner) {
                warn!(content = %post.id, error = %e, "failed to persist post");
            }
        }
    }

    pub(crate) fn persist_group(&mut self, group: &Group) {
        let owner = self.identity.0.clone();
        if let Ok(value) = serde_json::to_value(group) {
            if let Err(e) = self.items.save("groups", &group.id.0, &value, &owner) {
                warn!(group = %group.id, error = %e, "failed to persist group");
            }
        }
    }

    pub(crate) fn persist_profile(&mut self, profile: &Profile) {
        let owner = self.identity.0.clone();
        if let Ok(value) = serde_json::to_value(profile) {
            if let Err(e) = self.items.save("profiles", &profile.identity.0, &value, &owner) {
                warn!(identity = %profile.identity, error = %e, "failed to persist profile");
            }
        }
    }

    pub(crate) fn persist_message(&mut self, message: &ChatMessage) {
        let owner = self.identity.0.clone();
        if let Ok(value) = serde_json::to_value(message) {
            if let Err(e) = self.items.save("messages", &message.id, &value, &owner) {
                warn!(message = %message.id, error = %e, "failed to persist message");
            }
        }
    }

    pub(crate) fn persist_peers(&mut self) {
        let owner = self.identity.0.clone();
        let items: Vec<(String, serde_json::Value)> = self
            .peers
            .all()
            .into_iter()
            .filter_map(|peer| {
                serde_json::to_value(peer)
                    .ok()
                    .map(|value| (peer.address.0.clone(), value))
            })
            .collect();
        if let Err(e) = self.items.sync_all("peers", &items, &owner) {
            warn!(error = %e, "failed to persist peer table");
        }
    }

    // ---- outbound --------------------------------------------------------

    /// Queue a direct (non-gossip) packet for an address.
    pub(crate) fn queue_payload(&mut self, target: MeshAddress, payload: Payload) {
        let packet = Packet::new(payload, 0, self.address());
        self.seen.insert(packet.id.clone());
        self.outbox.push(Departure { target, packet, delay_ms: 0 });
    }

    /// Queue a packet addressed to a specific identity at a known home.
    pub(crate) fn queue_addressed(
        &mut self,
        target: MeshAddress,
        payload: Payload,
        identity: IdentityId,
    ) {
        let packet = Packet::addressed(payload, 0, self.address(), identity);
        self.seen.insert(packet.id.clone());
        self.outbox.push(Departure { target, packet, delay_ms: 0 });
    }

    /// Send the same payload directly to every trusted peer, optionally
    /// skipping one address. One packet id covers the whole broadcast.
    pub(crate) fn broadcast_to_trusted(&mut self, payload: Payload, skip: Option<&MeshAddress>) {
        let packet = Packet::new(payload, self.config.mesh.hop_budget, self.address());
        self.seen.insert(packet.id.clone());
        for address in self.peers.trusted_addresses() {
            if Some(&address) == skip {
                continue;
            }
            self.outbox.push(Departure {
                target: address,
                packet: packet.clone(),
                delay_ms: 0,
            });
        }
    }

    /// Re-forward a received gossip packet through the propagator.
    pub(crate) fn gossip_onward(&mut self, packet: &Packet, direct_sender: Option<&MeshAddress>) {
        let departures = gossip::propagate(
            packet,
            direct_sender,
            &self.peers,
            &self.address(),
            self.config.mesh.gossip_fanout,
            &mut self.rng,
        );
        self.outbox.extend(departures);
    }

    /// Originate a gossip payload from this node: the packet is marked
    /// seen locally and fanned out through the propagator.
    pub(crate) fn originate_gossip(&mut self, payload: Payload) {
        let packet = Packet::new(payload, self.config.mesh.hop_budget.saturating_add(1), self.address());
        self.seen.insert(packet.id.clone());
        self.gossip_onward(&packet, None);
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Take every pending outbound departure.
    pub fn drain_outbox(&mut self) -> Vec<Departure> {
        std::mem::take(&mut self.outbox)
    }

    /// Take every pending user-facing notification.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // ---- local API: contacts --------------------------------------------

    /// Explicitly add a contact address as trusted.
    pub fn add_contact(&mut self, address: MeshAddress, alias: String, now: u64) {
        self.peers.add_trusted(address, alias, now);
        self.persist_peers();
    }

    /// Block an address outright.
    pub fn block_peer(&mut self, address: &MeshAddress, now: u64) {
        self.peers.upsert_discovered(address.clone(), now);
        self.peers.set_trust(address, TrustClass::Blocked);
        self.persist_peers();
    }

    /// Send a signed connection request to an address. The target is
    /// trusted from our side immediately: trust is granted by the act of
    /// reaching out.
    pub fn request_connection(&mut self, address: MeshAddress, message: String, now: u64) {
        self.peers.add_trusted(address.clone(), String::new(), now);
        self.persist_peers();

        let public_key = hex::encode(self.crypto.public_key());
        let exchange_key = hex::encode(self.crypto.exchange_key());
        let own_address = self.address();
        let payload = connection_signing_bytes(
            &self.identity,
            &public_key,
            &exchange_key,
            &own_address,
            now,
        );
        let signature = hex::encode(self.crypto.sign(&payload));

        self.queue_payload(
            address,
            Payload::ConnectionRequest {
                identity: self.identity.clone(),
                alias: self.alias.clone(),
                public_key,
                exchange_key,
                address: own_address,
                message,
                sent_at: now,
                signature,
            },
        );
    }

    /// Accept a pending connection request from an address.
    pub fn accept_connection(&mut self, address: &MeshAddress, now: u64) -> MeshResult<()> {
        if self.peers.get(address).is_none() {
            return Err(MeshError::PeerNotFound(address.0.clone()));
        }
        self.peers.set_trust(address, TrustClass::Trusted);
        self.peers.mark_online(address, now);
        self.persist_peers();

        self.queue_payload(
            address.clone(),
            Payload::ConnectionAccept {
                identity: self.identity.clone(),
                alias: self.alias.clone(),
                public_key: hex::encode(self.crypto.public_key()),
                exchange_key: hex::encode(self.crypto.exchange_key()),
                address: self.address(),
            },
        );
        Ok(())
    }

    // ---- local API: content ---------------------------------------------

    /// Author and announce a broadcast.
    pub fn publish_post(
        &mut self,
        content: String,
        visibility: Visibility,
        media: Option<MediaMeta>,
        now: u64,
    ) -> MeshResult<ContentId> {
        self.ensure_ready()?;
        let id = ContentId::generate();
        let mut post = Post::new(
            id.clone(),
            self.identity.clone(),
            hex::encode(self.crypto.public_key()),
            content,
            now,
            visibility,
        );
        post.media = media;
        post.signature = hex::encode(self.crypto.sign(&post.signing_bytes()));
        post.refresh_hash();

        self.persist_post(&post);
        let announce = Payload::ContentAnnounce {
            content_id: id.clone(),
            content_hash: post.content_hash.clone(),
            author: self.identity.clone(),
            visibility: post.visibility,
            origin: Some(self.address()),
        };
        self.posts.insert(id.clone(), post);
        self.broadcast_to_trusted(announce, None);

        info!(content = %id, "published broadcast");
        Ok(id)
    }

    /// Edit one's own broadcast, re-signing the new revision.
    pub fn edit_post(&mut self, id: &ContentId, content: String, now: u64) -> MeshResult<()> {
        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;

        post.content = content.clone();
        post.edited_at = Some(now);
        let signing = post.signing_bytes();
        post.signature = hex::encode(self.crypto.sign(&signing));
        post.refresh_hash();
        let post = post.clone();
        self.persist_post(&post);

        self.originate_gossip(Payload::ContentEdit {
            content_id: id.clone(),
            author: self.identity.clone(),
            content,
            edited_at: now,
            signature: post.signature.clone(),
        });
        Ok(())
    }

    /// Delete one's own broadcast: an authenticated, propagated event.
    pub fn delete_post(&mut self, id: &ContentId, now: u64) -> MeshResult<()> {
        let post = self
            .posts
            .remove(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;

        let payload = delete_signing_bytes(id, &self.identity, now);
        let signature = hex::encode(self.crypto.sign(&payload));

        self.items.delete("posts", &id.0)?;
        if let Some(media) = &post.media {
            let _ = self.blobs.delete(&media.id.0);
        }

        self.originate_gossip(Payload::ContentDelete {
            content_id: id.clone(),
            author: self.identity.clone(),
            deleted_at: now,
            signature,
        });
        Ok(())
    }

    /// Vote on a broadcast and propagate the vote.
    pub fn vote_post(&mut self, id: &ContentId, dir: VoteDir) -> MeshResult<()> {
        let voter = self.identity.clone();
        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;
        if post.cast_vote(voter.clone(), dir) {
            let post = post.clone();
            self.persist_post(&post);
            self.originate_gossip(Payload::PostVote {
                content_id: id.clone(),
                voter,
                dir,
            });
        }
        Ok(())
    }

    /// Toggle a reaction on a broadcast and propagate it.
    pub fn react_post(&mut self, id: &ContentId, emoji: &str, active: bool) -> MeshResult<()> {
        let voter = self.identity.clone();
        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;
        if post.set_reaction(emoji, voter.clone(), active) {
            let post = post.clone();
            self.persist_post(&post);
            self.originate_gossip(Payload::PostReaction {
                content_id: id.clone(),
                emoji: emoji.to_string(),
                voter,
                active,
            });
        }
        Ok(())
    }

    /// Comment on a broadcast (or reply to a comment) and propagate.
    pub fn comment_post(
        &mut self,
        id: &ContentId,
        parent_id: Option<String>,
        content: String,
        now: u64,
    ) -> MeshResult<String> {
        let comment = Comment::new(random_token(), self.identity.clone(), content, now);
        let comment_id = comment.id.clone();

        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;
        if !veilmesh_domain::insert_reply(&mut post.comments, parent_id.as_deref(), comment.clone())
        {
            return Err(MeshError::ContentNotFound(format!(
                "comment parent in {id}"
            )));
        }
        post.refresh_hash();
        let post = post.clone();
        self.persist_post(&post);

        self.originate_gossip(Payload::CommentAdd {
            content_id: id.clone(),
            parent_id,
            comment,
        });
        Ok(comment_id)
    }

    /// Vote on a comment and propagate.
    pub fn vote_comment(
        &mut self,
        id: &ContentId,
        comment_id: &str,
        dir: VoteDir,
    ) -> MeshResult<()> {
        let voter = self.identity.clone();
        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;

        let mut changed = false;
        veilmesh_domain::update_node(&mut post.comments, comment_id, |c| {
            changed = c.cast_vote(voter.clone(), dir);
        });
        if changed {
            post.refresh_hash();
            let post = post.clone();
            self.persist_post(&post);
            self.originate_gossip(Payload::CommentVote {
                content_id: id.clone(),
                comment_id: comment_id.to_string(),
                voter,
                dir,
            });
        }
        Ok(())
    }

    /// Toggle a reaction on a comment and propagate.
    pub fn react_comment(
        &mut self,
        id: &ContentId,
        comment_id: &str,
        emoji: &str,
        active: bool,
    ) -> MeshResult<()> {
        let voter = self.identity.clone();
        let post = self
            .posts
            .get_mut(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;

        let mut changed = false;
        veilmesh_domain::update_node(&mut post.comments, comment_id, |c| {
            changed = c.set_reaction(emoji, voter.clone(), active);
        });
        if changed {
            post.refresh_hash();
            let post = post.clone();
            self.persist_post(&post);
            self.originate_gossip(Payload::CommentReaction {
                content_id: id.clone(),
                comment_id: comment_id.to_string(),
                emoji: emoji.to_string(),
                voter,
                active,
            });
        }
        Ok(())
    }

    // ---- local API: messaging -------------------------------------------

    /// Seal and send a direct message to a known identity.
    pub fn send_direct(&mut self, to: &IdentityId, body: String, now: u64) -> MeshResult<String> {
        self.ensure_ready()?;
        let peer = self
            .peers
            .find_by_identity(to)
            .ok_or_else(|| MeshError::PeerNotFound(to.0.clone()))?;
        let address = peer.address.clone();
        let exchange_hex = peer
            .exchange_key
            .clone()
            .ok_or_else(|| MeshError::NoExchangeKey(to.0.clone()))?;
        let their_key =
            hex::decode(&exchange_hex).map_err(|_| MeshError::NoExchangeKey(to.0.clone()))?;

        let sealed = self
            .crypto
            .encrypt(body.as_bytes(), &their_key)
            .map_err(MeshError::Collaborator)?;

        let message_id = random_token();
        let message = ChatMessage {
            id: message_id.clone(),
            from: self.identity.clone(),
            to: to.clone(),
            body,
            sent_at: now,
            read: true,
        };
        self.messages.insert(message_id.clone(), message.clone());
        self.persist_message(&message);

        self.queue_addressed(
            address,
            Payload::DirectMessage {
                message_id: message_id.clone(),
                from: self.identity.clone(),
                sealed: hex::encode(sealed),
                sent_at: now,
            },
            to.clone(),
        );
        Ok(message_id)
    }

    /// Send an ephemeral typing signal.
    pub fn set_typing(&mut self, to: &IdentityId, typing: bool) -> MeshResult<()> {
        let peer = self
            .peers
            .find_by_identity(to)
            .ok_or_else(|| MeshError::PeerNotFound(to.0.clone()))?;
        let address = peer.address.clone();
        self.queue_addressed(
            address,
            Payload::TypingIndicator {
                from: self.identity.clone(),
                typing,
            },
            to.clone(),
        );
        Ok(())
    }

    /// Mark a received message as read.
    pub fn mark_read(&mut self, message_id: &str) {
        if let Some(message) = self.messages.get_mut(message_id) {
            if !message.read {
                message.read = true;
                let message = message.clone();
                self.persist_message(&message);
            }
        }
    }

    // ---- local API: groups ----------------------------------------------

    /// Create a group and invite its initial members.
    pub fn create_group(
        &mut self,
        name: String,
        members: Vec<IdentityId>,
        now: u64,
    ) -> ContentId {
        let id = ContentId::generate();
        let mut group = Group {
            id: id.clone(),
            name,
            owner: self.identity.clone(),
            members: members.into_iter().collect(),
            created_at: now,
            updated_at: now,
        };
        group.members.insert(self.identity.clone());

        self.persist_group(&group);
        self.groups.insert(id.clone(), group.clone());

        for member in group.members.clone() {
            if member == self.identity {
                continue;
            }
            if let Some(peer) = self.peers.find_by_identity(&member) {
                let address = peer.address.clone();
                self.queue_addressed(
                    address,
                    Payload::GroupInvite {
                        group: group.clone(),
                        from: self.identity.clone(),
                    },
                    member,
                );
            }
        }
        id
    }

    /// Update a group's state and propagate the new replica.
    pub fn update_group(&mut self, group: Group) -> MeshResult<()> {
        self.persist_group(&group);
        self.groups.insert(group.id.clone(), group.clone());
        self.originate_gossip(Payload::GroupUpdate { group });
        Ok(())
    }

    /// Delete a group one owns.
    pub fn delete_group(&mut self, id: &ContentId) -> MeshResult<()> {
        let group = self
            .groups
            .get(id)
            .ok_or_else(|| MeshError::ContentNotFound(id.0.clone()))?;
        if group.owner != self.identity {
            return Err(MeshError::ContentNotFound(id.0.clone()));
        }
        self.groups.remove(id);
        self.items.delete("groups", &id.0)?;
        self.originate_gossip(Payload::GroupDelete {
            group_id: id.clone(),
            owner: self.identity.clone(),
        });
        Ok(())
    }

    // ---- local API: media -----------------------------------------------

    /// Store media bytes this node originates (or proxy-holds), guarded
    /// by the object's capability token. Anyone waitlisted for this
    /// content learns that a source now exists.
    pub fn store_media(&mut self, id: &ContentId, bytes: &[u8], token: &str) -> MeshResult<()> {
        self.blobs.save(&id.0, bytes, token)?;
        for waiter in self.relays.take_waiters(id) {
            self.queue_payload(
                waiter,
                Payload::RecoveryFound {
                    content_id: id.clone(),
                    source: self.address(),
                },
            );
        }
        Ok(())
    }

    /// Download a media object. Returns a ticket resolved by a later
    /// `TransferCompleted`/`TransferFailed` notification.
    pub fn download_media(
        &mut self,
        meta: MediaMeta,
        origin: Option<MeshAddress>,
        owner: Option<IdentityId>,
        now: u64,
    ) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        // Already held locally: resolve immediately at 100%
        if let Ok(Some(bytes)) = self.blobs.get(&meta.id.0) {
            self.notify(Notification::TransferCompleted {
                content_id: meta.id.clone(),
                ticket,
                size_bytes: bytes.len(),
            });
            return ticket;
        }

        let source_trusted = origin
            .as_ref()
            .map(|addr| self.peers.is_trusted(addr))
            .unwrap_or(false);
        let chunk_size = self.config.transfer.chunk_size;
        let start = self.transfers.begin(
            meta.clone(),
            origin.clone(),
            source_trusted,
            false,
            Listener::Local(ticket),
            chunk_size,
            now,
        );

        match start {
            DownloadStart::Attached => {}
            DownloadStart::Started { requests } => {
                for request in requests {
                    self.send_chunk_request(request);
                }
            }
            DownloadStart::Recovering => {
                self.attempt_recovery(meta.id.clone(), Some(meta), origin, owner, now);
            }
        }
        ticket
    }

    /// Flood a relay request to every trusted peer except the dead source.
    pub(crate) fn attempt_recovery(
        &mut self,
        content_id: ContentId,
        meta: Option<MediaMeta>,
        origin_hint: Option<MeshAddress>,
        owner: Option<IdentityId>,
        now: u64,
    ) {
        let access_key = meta.as_ref().map(|m| m.access_key.clone());
        let payload = Payload::RelayRequest {
            content_id: content_id.clone(),
            origin_hint: origin_hint.clone(),
            owner,
            access_key,
            meta,
        };
        debug!(content = %content_id, "flooding relay request");
        self.relays.prune(now);
        self.broadcast_to_trusted(payload, origin_hint.as_ref());
    }

    pub(crate) fn send_chunk_request(&mut self, request: ChunkRequest) {
        self.queue_payload(
            request.target.clone(),
            Payload::ChunkRequest {
                content_id: request.content_id,
                index: request.index,
                chunk_size: request.chunk_size,
                access_key: request.access_key,
            },
        );
    }

    /// Execute the side effects a transfer-manager call produced.
    pub(crate) fn apply_transfer_events(&mut self, events: Vec<TransferEvent>, now: u64) {
        for event in events {
            match event {
                TransferEvent::Request(request) => self.send_chunk_request(request),
                TransferEvent::Completed {
                    content_id,
                    meta,
                    bytes,
                    listeners,
                } => {
                    if let Err(e) = self.blobs.save(&content_id.0, &bytes, &meta.access_key) {
                        warn!(content = %content_id, error = %e, "failed to store media");
                    }
                    info!(content = %content_id, size = bytes.len(), "media transfer complete");

                    for listener in listeners {
                        match listener {
                            Listener::Local(ticket) => self.notify(Notification::TransferCompleted {
                                content_id: content_id.clone(),
                                ticket,
                                size_bytes: bytes.len(),
                            }),
                            Listener::RelayServe { requester } => {
                                self.queue_payload(
                                    requester,
                                    Payload::RecoveryFound {
                                        content_id: content_id.clone(),
                                        source: self.address(),
                                    },
                                );
                            }
                        }
                    }
                    // Anyone parked on our waitlist can now fetch from us
                    for waiter in self.relays.take_waiters(&content_id) {
                        self.queue_payload(
                            waiter,
                            Payload::RecoveryFound {
                                content_id: content_id.clone(),
                                source: self.address(),
                            },
                        );
                    }
                }
                TransferEvent::Failed {
                    content_id,
                    reason,
                    listeners,
                } => {
                    warn!(content = %content_id, reason = %reason, "media transfer failed");
                    for listener in listeners {
                        if let Listener::Local(ticket) = listener {
                            self.notify(Notification::TransferFailed {
                                content_id: content_id.clone(),
                                ticket,
                                reason: reason.clone(),
                            });
                        }
                    }
                }
                TransferEvent::RecoveryNeeded {
                    content_id,
                    meta,
                    dead_source,
                } => {
                    let owner = self
                        .posts
                        .values()
                        .find(|p| p.media.as_ref().map(|m| &m.id) == Some(&content_id))
                        .map(|p| p.author.clone());
                    self.attempt_recovery(content_id, Some(meta), dead_source, owner, now);
                }
            }
        }
    }

    // ---- timers ----------------------------------------------------------

    /// 1 s maintenance tick: transfer timeouts, retries, recovery expiry.
    pub fn tick_transfers(&mut self, now: u64) {
        let events = self.transfers.tick(now);
        if !events.is_empty() {
            self.apply_transfer_events(events, now);
        }
    }

    /// 2 min tick: demote stale online peers.
    pub fn tick_peers(&mut self, now: u64) {
        let demoted = self.peers.sweep_stale(now);
        if !demoted.is_empty() {
            debug!(count = demoted.len(), "demoted stale peers to offline");
            self.persist_peers();
        }
    }

    /// 10 min tick: presence heartbeat to the mesh.
    pub fn tick_presence(&mut self, _now: u64) {
        self.broadcast_to_trusted(
            Payload::PresenceAnnounce {
                identity: self.identity.clone(),
                alias: self.alias.clone(),
                address: Some(self.address()),
            },
            None,
        );
    }

    /// Hourly tick: full inventory reconciliation with all trusted peers.
    pub fn tick_inventory(&mut self, now: u64) {
        self.relays.prune(now);
        let digest = inventory::build_digest(&self.posts, self.config.sync.digest_window);
        self.broadcast_to_trusted(
            Payload::InventoryRequest {
                digest,
                want_profile: true,
                want_peers: true,
            },
            None,
        );
    }

    /// Request an inventory exchange with one peer (reconnect trigger).
    pub(crate) fn request_sync_with(&mut self, address: MeshAddress) {
        let digest = inventory::build_digest(&self.posts, self.config.sync.digest_window);
        self.queue_payload(
            address,
            Payload::InventoryRequest {
                digest,
                want_profile: true,
                want_peers: false,
            },
        );
    }

    /// Announce this node is going away; peers will ack.
    pub fn graceful_shutdown(&mut self) {
        self.broadcast_to_trusted(
            Payload::ShutdownNotice {
                identity: self.identity.clone(),
            },
            None,
        );
    }

    /// Operational snapshot.
    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            identity: self.identity.clone(),
            alias: self.alias.clone(),
            address: self.address(),
            ready: self.ready,
            peer_count: self.peers.peer_count(),
            online_peers: self.peers.online_count(),
            post_count: self.posts.len(),
            active_transfers: self.transfers.session_count(),
        }
    }

    /// Park a packet for an identity that is not home right now.
    pub(crate) fn park_for(&mut self, identity: IdentityId, packet: Packet) {
        if self.peers.find_by_identity(&identity).is_none() {
            debug!(identity = %identity, "dropping packet for unknown identity");
            return;
        }
        let queue = self.parked.entry(identity).or_default();
        if queue.len() >= PARKED_CAP {
            queue.remove(0);
        }
        queue.push(packet);
    }

    /// Flush the parked mailbox for an identity to its home address.
    pub(crate) fn deliver_parked(&mut self, identity: &IdentityId, address: &MeshAddress) {
        if let Some(parked) = self.parked.remove(identity) {
            debug!(identity = %identity, count = parked.len(), "delivering parked packets");
            for mut packet in parked {
                packet.sender = self.address();
                self.outbox.push(Departure {
                    target: address.clone(),
                    packet,
                    delay_ms: 0,
                });
            }
        }
    }

    /// A peer transitioned offline→online: deliver its parked mailbox
    /// and, if trusted, reconcile inventories.
    pub(crate) fn on_peer_online(&mut self, address: MeshAddress, _now: u64) {
        let identity = self.peers.get(&address).and_then(|p| p.identity.clone());
        if let Some(identity) = identity {
            self.deliver_parked(&identity, &address);
        }
        if self.peers.is_trusted(&address) {
            self.request_sync_with(address);
        }
    }

    pub(crate) fn ensure_ready(&self) -> MeshResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(MeshError::NotReady)
        }
    }
}

/// Canonical byte payload covered by a deletion event's signature.
pub(crate) fn delete_signing_bytes(
    content_id: &ContentId,
    author: &IdentityId,
    deleted_at: u64,
) -> Vec<u8> {
    serde_json::to_vec(&(content_id, author, "delete", deleted_at))
        .expect("delete signing payload serializes")
}

/// Merge an incoming replica into local state. Returns the merged post
/// when its hash moved (caller persists and re-announces).
pub(crate) fn merge_into(local: &Post, incoming: &Post) -> Option<Post> {
    let merged = merge_posts(local, incoming);
    if merged.content_hash != local.content_hash {
        Some(merged)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use veilmesh_core::{MemoryHub, MeshCrypto, SqliteBlobStore, SqliteItemStore};
    use veilmesh_domain::Visibility;

    fn engine_with(hub: &MemoryHub, label: &str) -> (MeshEngine, Arc<MeshCrypto>) {
        let crypto = Arc::new(MeshCrypto::generate());
        let mut engine = MeshEngine::new(
            Config::default_config(),
            label.to_string(),
            crypto.clone(),
            Arc::new(hub.register(label)),
            Box::new(SqliteItemStore::in_memory().unwrap()),
            Box::new(SqliteBlobStore::in_memory().unwrap()),
        );
        engine.seed_rng(42);
        (engine, crypto)
    }

    fn signed_post(author: &MeshCrypto, content: &str, created_at: u64) -> Post {
        let identity = IdentityId(hex::encode(author.public_key()));
        let mut post = Post::new(
            ContentId::generate(),
            identity,
            hex::encode(author.public_key()),
            content.to_string(),
            created_at,
            Visibility::Public,
        );
        post.signature = hex::encode(author.sign(&post.signing_bytes()));
        post.refresh_hash();
        post
    }

    #[test]
    fn test_duplicate_packet_is_idempotent() {
        let hub = MemoryHub::new();
        let (mut bob, _) = engine_with(&hub, "bob");
        let alice_crypto = MeshCrypto::generate();
        let alice_addr = MeshAddress("mem-alice".to_string());

        bob.load(0).unwrap();
        bob.add_contact(alice_addr.clone(), "Alice".to_string(), 0);

        let post = signed_post(&alice_crypto, "hello", 1000);
        let packet = Packet::new(
            Payload::ContentData { post: post.clone() },
            6,
            alice_addr.clone(),
        );

        bob.handle_packet(packet.clone(), alice_addr.clone(), false, 10);
        assert!(bob.post(&post.id).is_some());
        let outbox_after_first = bob.drain_outbox().len();
        let hash_after_first = bob.post(&post.id).unwrap().content_hash.clone();

        // Redelivery: no new state mutation, no re-broadcast
        bob.handle_packet(packet, alice_addr, false, 20);
        assert!(bob.drain_outbox().is_empty());
        assert_eq!(bob.post(&post.id).unwrap().content_hash, hash_after_first);
        assert!(outbox_after_first > 0);
    }

    #[test]
    fn test_firewall_blocks_untrusted_gossip() {
        let hub = MemoryHub::new();
        let (mut bob, _) = engine_with(&hub, "bob");
        bob.load(0).unwrap();

        let stranger_crypto = MeshCrypto::generate();
        let stranger = MeshAddress("mem-stranger".to_string());
        let post = signed_post(&stranger_crypto, "spam", 1000);
        let id = post.id.clone();

        let packet = Packet::new(Payload::ContentData { post }, 6, stranger.clone());
        bob.handle_packet(packet, stranger, false, 10);

        assert!(bob.post(&id).is_none());
        assert!(bob.drain_outbox().is_empty());
    }

    #[test]
    fn test_bad_signature_never_mutates_state() {
        let hub = MemoryHub::new();
        let (mut bob, _) = engine_with(&hub, "bob");
        let alice_addr = MeshAddress("mem-alice".to_string());
        bob.load(0).unwrap();
        bob.add_contact(alice_addr.clone(), "Alice".to_string(), 0);

        let alice_crypto = MeshCrypto::generate();
        let mut post = signed_post(&alice_crypto, "genuine", 1000);
        post.content = "tampered".to_string();
        post.refresh_hash();
        let id = post.id.clone();

        let packet = Packet::new(Payload::ContentData { post }, 6, alice_addr.clone());
        bob.handle_packet(packet, alice_addr, false, 10);
        assert!(bob.post(&id).is_none());
    }

    #[test]
    fn test_boot_queue_replays_after_load() {
        let hub = MemoryHub::new();
        let (mut bob, _) = engine_with(&hub, "bob");
        let alice_crypto = MeshCrypto::generate();
        let alice_addr = MeshAddress("mem-alice".to_string());

        // Trust is persisted state; simulate by adding before load but
        // packets still arrive pre-ready
        bob.add_contact(alice_addr.clone(), "Alice".to_string(), 0);

        let post = signed_post(&alice_crypto, "early bird", 1000);
        let id = post.id.clone();
        let packet = Packet::new(Payload::ContentData { post }, 6, alice_addr.clone());

        bob.handle_packet(packet, alice_addr, false, 5);
        assert!(bob.post(&id).is_none(), "not handled before load");

        bob.load(10).unwrap();
        assert!(bob.post(&id).is_some(), "replayed after load");
        // Replay suppresses fresh notifications
        assert!(bob
            .drain_notifications()
            .iter()
            .all(|n| !matches!(n, Notification::PostReceived { .. })));
    }

    #[test]
    fn test_packets_for_absent_identity_are_parked() {
        let hub = MemoryHub::new();
        let (mut bob, _) = engine_with(&hub, "bob");
        let alice_addr = MeshAddress("mem-alice".to_string());
        let carol_addr = MeshAddress("mem-carol".to_string());
        let carol_identity = IdentityId("carol-identity".to_string());

        bob.load(0).unwrap();
        bob.add_contact(alice_addr.clone(), "Alice".to_string(), 0);
        bob.add_contact(carol_addr.clone(), "Carol".to_string(), 0);
        bob.peers
            .get_mut(&carol_addr)
            .unwrap()
            .identity = Some(carol_identity.clone());

        // Alice routes a message for carol through bob
        let packet = Packet::addressed(
            Payload::TypingIndicator {
                from: IdentityId("alice-identity".to_string()),
                typing: true,
            },
            0,
            alice_addr.clone(),
            carol_identity.clone(),
        );
        bob.handle_packet(packet, alice_addr, false, 10);
        bob.drain_outbox();
        assert_eq!(bob.parked.get(&carol_identity).map(Vec::len), Some(1));

        // Carol comes online: parked mail goes out to her home address
        bob.peers.mark_offline(&carol_addr);
        let came_online = bob.peers.mark_online(&carol_addr, 20);
        assert!(came_online);
        bob.on_peer_online(carol_addr.clone(), 20);

        let departures = bob.drain_outbox();
        assert!(departures.iter().any(|d| d.target == carol_addr));
        assert!(bob.parked.get(&carol_identity).is_none());
    }

    #[test]
    fn test_publish_announces_to_trusted_peers() {
        let hub = MemoryHub::new();
        let (mut alice, _) = engine_with(&hub, "alice");
        alice.load(0).unwrap();
        alice.add_contact(MeshAddress("mem-bob".to_string()), "Bob".to_string(), 0);
        alice.add_contact(MeshAddress("mem-carol".to_string()), "Carol".to_string(), 0);

        alice
            .publish_post("hello mesh".to_string(), Visibility::Public, None, 1000)
            .unwrap();

        let departures = alice.drain_outbox();
        assert_eq!(departures.len(), 2);
        for dep in &departures {
            assert!(matches!(
                dep.packet.payload,
                Payload::ContentAnnounce { .. }
            ));
        }
    }

    #[test]
    fn test_status_snapshot() {
        let hub = MemoryHub::new();
        let (mut engine, _) = engine_with(&hub, "node");
        engine.load(0).unwrap();

        let status = engine.status();
        assert!(status.ready);
        assert_eq!(status.post_count, 0);
        assert_eq!(status.active_transfers, 0);
        assert_eq!(status.address, MeshAddress("mem-node".to_string()));
    }
}
