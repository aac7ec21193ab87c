//! Wire packet model.
//!
//! A packet is an envelope around one protocol payload. The envelope's
//! `sender` is the **link sender**: every relayer overwrites it with its
//! own address before transmission, so it only ever identifies the last
//! hop. Content authorship travels inside the payload and is stripped
//! before re-forwarding (see [`Payload::strip_origin`]).

use serde::{Deserialize, Serialize};
use veilmesh_core::{ContentId, IdentityId, MeshAddress, PacketId};
use veilmesh_domain::{Comment, Group, MediaMeta, Post, Profile, Visibility, VoteDir};

/// One entry of an inventory digest: enough to detect a missing or
/// stale replica without shipping the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub id: ContentId,
    pub content_hash: String,
}

/// Envelope for every protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    /// Idempotency token, generated once by the originator.
    pub id: PacketId,
    /// Remaining relay hops; forwarding stops at 0.
    pub hop_budget: u8,
    /// Immediate link sender, overwritten at every hop.
    pub sender: MeshAddress,
    /// Addressed end-user identity, when the payload is for a specific
    /// person rather than whoever holds the receiving address.
    pub target: Option<IdentityId>,
    pub payload: Payload,
}

impl Packet {
    /// Build a fresh locally originated packet.
    pub fn new(payload: Payload, hop_budget: u8, sender: MeshAddress) -> Self {
        Self {
            id: PacketId::generate(),
            hop_budget,
            sender,
            target: None,
            payload,
        }
    }

    /// Build a fresh packet addressed to a specific identity.
    pub fn addressed(
        payload: Payload,
        hop_budget: u8,
        sender: MeshAddress,
        target: IdentityId,
    ) -> Self {
        Self {
            id: PacketId::generate(),
            hop_budget,
            sender,
            target: Some(target),
            payload,
        }
    }

    /// Serialize for the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the transport.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Protocol message kinds, one variant per kind.
///
/// The dispatcher matches exhaustively over this enum, so adding a kind
/// forces every routing decision to be revisited at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Node liveness announcement, gossiped. `address` is an origin
    /// hint: trusted only when it matches the link sender, stripped on
    /// every re-forward.
    PresenceAnnounce {
        identity: IdentityId,
        alias: String,
        address: Option<MeshAddress>,
    },
    /// Graceful sign-off; does not refresh liveness.
    PresenceGoodbye { identity: IdentityId },
    /// Node going down entirely, gossiped; acknowledged by peers.
    ShutdownNotice { identity: IdentityId },
    /// Acknowledgment of a shutdown notice, sent directly.
    ShutdownAck,

    /// Signed handshake asking to become a contact. Reachable from
    /// untrusted senders; verified before any side effect.
    ConnectionRequest {
        identity: IdentityId,
        alias: String,
        /// Hex-encoded public signing key.
        public_key: String,
        /// Hex-encoded public exchange key.
        exchange_key: String,
        /// The requester's own rendezvous address, for the reply.
        address: MeshAddress,
        message: String,
        sent_at: u64,
        /// Hex-encoded signature over [`connection_signing_bytes`].
        signature: String,
    },
    /// Positive reply to a connection request.
    ConnectionAccept {
        identity: IdentityId,
        alias: String,
        public_key: String,
        exchange_key: String,
        address: MeshAddress,
    },

    /// Sealed direct message for the target identity.
    DirectMessage {
        message_id: String,
        from: IdentityId,
        /// Hex-encoded sealed box.
        sealed: String,
        sent_at: u64,
    },
    /// Ephemeral typing signal; never persisted.
    TypingIndicator { from: IdentityId, typing: bool },

    /// Lightweight announcement that content exists at some hash.
    ContentAnnounce {
        content_id: ContentId,
        content_hash: String,
        author: IdentityId,
        visibility: Visibility,
        /// Origin hint, stripped on re-forward.
        origin: Option<MeshAddress>,
    },
    /// Request for the full content of a broadcast.
    ContentFetch { content_id: ContentId },
    /// Full broadcast, signature embedded in the post itself.
    ContentData { post: Post },
    /// Author's edit of their own broadcast, re-signed.
    ContentEdit {
        content_id: ContentId,
        author: IdentityId,
        content: String,
        edited_at: u64,
        signature: String,
    },
    /// Authenticated deletion event.
    ContentDelete {
        content_id: ContentId,
        author: IdentityId,
        deleted_at: u64,
        signature: String,
    },

    /// Vote on a broadcast.
    PostVote {
        content_id: ContentId,
        voter: IdentityId,
        dir: VoteDir,
    },
    /// Vote on a comment.
    CommentVote {
        content_id: ContentId,
        comment_id: String,
        voter: IdentityId,
        dir: VoteDir,
    },
    /// Reaction toggled on a broadcast.
    PostReaction {
        content_id: ContentId,
        emoji: String,
        voter: IdentityId,
        active: bool,
    },
    /// Reaction toggled on a comment.
    CommentReaction {
        content_id: ContentId,
        comment_id: String,
        emoji: String,
        voter: IdentityId,
        active: bool,
    },
    /// New comment or reply.
    CommentAdd {
        content_id: ContentId,
        parent_id: Option<String>,
        comment: Comment,
    },

    /// Digest of recent local content; asks for anything newer.
    InventoryRequest {
        digest: Vec<DigestEntry>,
        want_profile: bool,
        want_peers: bool,
    },
    /// Items the sender holds that the requester lacks, plus optional
    /// profile metadata and a peer-exchange list.
    InventoryResponse {
        posts: Vec<Post>,
        profile: Option<Profile>,
        known_peers: Vec<MeshAddress>,
    },

    /// Invitation into a group.
    GroupInvite { group: Group, from: IdentityId },
    /// Updated group state, gossiped and merged by member union.
    GroupUpdate { group: Group },
    /// Ask a peer for its replica of a group.
    GroupQuery { group_id: ContentId },
    /// Reply to a group query.
    GroupSync { groups: Vec<Group> },
    /// Owner-only group deletion.
    GroupDelete { group_id: ContentId, owner: IdentityId },

    /// Request for one chunk of a media object. Reachable from
    /// untrusted senders; gated by the capability token.
    ChunkRequest {
        content_id: ContentId,
        index: u32,
        chunk_size: u32,
        access_key: String,
    },
    /// One chunk of a media object, hex-encoded.
    ChunkResponse {
        content_id: ContentId,
        index: u32,
        total: u32,
        data: String,
    },
    /// Flooded request for anyone who can serve or reach a media object.
    RelayRequest {
        content_id: ContentId,
        origin_hint: Option<MeshAddress>,
        owner: Option<IdentityId>,
        access_key: Option<String>,
        meta: Option<MediaMeta>,
    },
    /// A peer found (or became) a viable source for a media object.
    RecoveryFound {
        content_id: ContentId,
        source: MeshAddress,
    },
}

impl Payload {
    /// Short kind name for log lines.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::PresenceAnnounce { .. } => "presence_announce",
            Payload::PresenceGoodbye { .. } => "presence_goodbye",
            Payload::ShutdownNotice { .. } => "shutdown_notice",
            Payload::ShutdownAck => "shutdown_ack",
            Payload::ConnectionRequest { .. } => "connection_request",
            Payload::ConnectionAccept { .. } => "connection_accept",
            Payload::DirectMessage { .. } => "direct_message",
            Payload::TypingIndicator { .. } => "typing_indicator",
            Payload::ContentAnnounce { .. } => "content_announce",
            Payload::ContentFetch { .. } => "content_fetch",
            Payload::ContentData { .. } => "content_data",
            Payload::ContentEdit { .. } => "content_edit",
            Payload::ContentDelete { .. } => "content_delete",
            Payload::PostVote { .. } => "post_vote",
            Payload::CommentVote { .. } => "comment_vote",
            Payload::PostReaction { .. } => "post_reaction",
            Payload::CommentReaction { .. } => "comment_reaction",
            Payload::CommentAdd { .. } => "comment_add",
            Payload::InventoryRequest { .. } => "inventory_request",
            Payload::InventoryResponse { .. } => "inventory_response",
            Payload::GroupInvite { .. } => "group_invite",
            Payload::GroupUpdate { .. } => "group_update",
            Payload::GroupQuery { .. } => "group_query",
            Payload::GroupSync { .. } => "group_sync",
            Payload::GroupDelete { .. } => "group_delete",
            Payload::ChunkRequest { .. } => "chunk_request",
            Payload::ChunkResponse { .. } => "chunk_response",
            Payload::RelayRequest { .. } => "relay_request",
            Payload::RecoveryFound { .. } => "recovery_found",
        }
    }

    /// Whether this kind spreads through the gossip propagator.
    pub fn is_gossip(&self) -> bool {
        matches!(
            self,
            Payload::PresenceAnnounce { .. }
                | Payload::PresenceGoodbye { .. }
                | Payload::ShutdownNotice { .. }
                | Payload::ContentAnnounce { .. }
                | Payload::ContentEdit { .. }
                | Payload::ContentDelete { .. }
                | Payload::PostVote { .. }
                | Payload::CommentVote { .. }
                | Payload::PostReaction { .. }
                | Payload::CommentReaction { .. }
                | Payload::CommentAdd { .. }
                | Payload::GroupUpdate { .. }
                | Payload::GroupDelete { .. }
        )
    }

    /// Whether this kind must be reachable from untrusted senders:
    /// the signed handshake kinds (to bootstrap trust) and the two
    /// media chunk kinds (gated by the capability token instead).
    pub fn allowed_untrusted(&self) -> bool {
        matches!(
            self,
            Payload::ConnectionRequest { .. }
                | Payload::ConnectionAccept { .. }
                | Payload::ChunkRequest { .. }
                | Payload::ChunkResponse { .. }
        )
    }

    /// Whether receiving this kind refreshes the sender's liveness.
    /// Sign-off notices do not: they mean the opposite.
    pub fn refreshes_liveness(&self) -> bool {
        !matches!(
            self,
            Payload::PresenceGoodbye { .. } | Payload::ShutdownNotice { .. }
        )
    }

    /// Remove origin hints before re-forwarding, so the relay path
    /// never leaks who published.
    pub fn strip_origin(&mut self) {
        match self {
            Payload::PresenceAnnounce { address, .. } => *address = None,
            Payload::ContentAnnounce { origin, .. } => *origin = None,
            _ => {}
        }
    }
}

/// Canonical byte payload covered by a connection request's signature.
pub fn connection_signing_bytes(
    identity: &IdentityId,
    public_key: &str,
    exchange_key: &str,
    address: &MeshAddress,
    sent_at: u64,
) -> Vec<u8> {
    serde_json::to_vec(&(identity, public_key, exchange_key, address, sent_at))
        .expect("handshake signing payload serializes")
}
