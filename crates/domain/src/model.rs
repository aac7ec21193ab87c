//! Content model: broadcasts, comments, profiles, groups, messages.
//!
//! Vote maps and reaction sets use ordered collections so that JSON
//! serialization is canonical; the content fingerprint depends on it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use veilmesh_core::{ContentId, IdentityId};

/// Direction of a vote. One vote per voter per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteDir {
    /// Upvote
    Up,
    /// Downvote
    Down,
}

/// Who may see a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible to anyone who obtains it
    Public,
    /// Visible only to explicitly connected peers
    ConnectionsOnly,
}

/// Metadata describing a media object attached to a broadcast.
///
/// `access_key` is the per-object capability token a holder must present
/// to pull the bytes from a blob store that does not trust it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMeta {
    pub id: ContentId,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub access_key: String,
}

/// A threaded comment. Replies recurse; depth is capped at merge and
/// insert time (see [`crate::tree`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: IdentityId,
    pub content: String,
    pub created_at: u64,
    pub edited_at: Option<u64>,
    pub votes: BTreeMap<IdentityId, VoteDir>,
    pub reactions: BTreeMap<String, BTreeSet<IdentityId>>,
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Create a fresh comment with no votes, reactions, or replies.
    pub fn new(id: String, author: IdentityId, content: String, created_at: u64) -> Self {
        Self {
            id,
            author,
            content,
            created_at,
            edited_at: None,
            votes: BTreeMap::new(),
            reactions: BTreeMap::new(),
            replies: Vec::new(),
        }
    }

    /// Record a vote, replacing any previous vote by the same voter.
    /// Returns true when the stored state changed.
    pub fn cast_vote(&mut self, voter: IdentityId, dir: VoteDir) -> bool {
        self.votes.insert(voter, dir) != Some(dir)
    }

    /// Add or remove a reaction. Returns true when the stored state changed.
    pub fn set_reaction(&mut self, emoji: &str, voter: IdentityId, active: bool) -> bool {
        if active {
            self.reactions.entry(emoji.to_string()).or_default().insert(voter)
        } else {
            let Some(voters) = self.reactions.get_mut(emoji) else {
                return false;
            };
            let removed = voters.remove(&voter);
            if voters.is_empty() {
                self.reactions.remove(emoji);
            }
            removed
        }
    }
}

/// A broadcast: the unit of public/connection-scoped content.
///
/// `content_hash` is derived from the mutable fields and must be
/// recomputed after every mutation ([`Post::refresh_hash`]); it is never
/// an authoritative input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: ContentId,
    pub author: IdentityId,
    /// Hex-encoded public signing key of the author.
    pub author_public_key: String,
    pub content: String,
    pub media: Option<MediaMeta>,
    /// Hex-encoded signature over [`Post::signing_bytes`].
    pub signature: String,
    pub created_at: u64,
    pub edited_at: Option<u64>,
    pub visibility: Visibility,
    pub votes: BTreeMap<IdentityId, VoteDir>,
    pub reactions: BTreeMap<String, BTreeSet<IdentityId>>,
    pub comments: Vec<Comment>,
    pub content_hash: String,
}

impl Post {
    /// Create an unsigned post shell; the caller signs and refreshes the
    /// hash before the post leaves the node.
    pub fn new(
        id: ContentId,
        author: IdentityId,
        author_public_key: String,
        content: String,
        created_at: u64,
        visibility: Visibility,
    ) -> Self {
        let mut post = Self {
            id,
            author,
            author_public_key,
            content,
            media: None,
            signature: String::new(),
            created_at,
            edited_at: None,
            visibility,
            votes: BTreeMap::new(),
            reactions: BTreeMap::new(),
            comments: Vec::new(),
            content_hash: String::new(),
        };
        post.refresh_hash();
        post
    }

    /// Canonical byte payload covered by the author's signature.
    ///
    /// Covers the current revision: an edit re-signs with the new content
    /// and edit timestamp, so verification always runs against the fields
    /// actually stored.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let revision_ts = self.edited_at.unwrap_or(self.created_at);
        serde_json::to_vec(&(
            &self.id,
            &self.author,
            &self.content,
            self.created_at,
            revision_ts,
        ))
        .expect("post signing payload serializes")
    }

    /// Timestamp of the current content revision.
    pub fn revision_ts(&self) -> u64 {
        self.edited_at.unwrap_or(self.created_at)
    }

    /// Record a vote, replacing any previous vote by the same voter.
    pub fn cast_vote(&mut self, voter: IdentityId, dir: VoteDir) -> bool {
        let changed = self.votes.insert(voter, dir) != Some(dir);
        if changed {
            self.refresh_hash();
        }
        changed
    }

    /// Add or remove a reaction.
    pub fn set_reaction(&mut self, emoji: &str, voter: IdentityId, active: bool) -> bool {
        let changed = if active {
            self.reactions.entry(emoji.to_string()).or_default().insert(voter)
        } else {
            match self.reactions.get_mut(emoji) {
                Some(voters) => {
                    let removed = voters.remove(&voter);
                    if voters.is_empty() {
                        self.reactions.remove(emoji);
                    }
                    removed
                }
                None => false,
            }
        };
        if changed {
            self.refresh_hash();
        }
        changed
    }

    /// Recompute the content fingerprint from the mutable fields.
    /// Returns true when the hash changed.
    pub fn refresh_hash(&mut self) -> bool {
        let next = crate::hash::fingerprint(self);
        let changed = next != self.content_hash;
        self.content_hash = next;
        changed
    }
}

/// Identity metadata cached for contacts and refreshed via inventory sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub identity: IdentityId,
    pub display_name: String,
    pub bio: String,
    /// Hex-encoded public signing key.
    pub public_key: String,
    /// Hex-encoded public exchange key for sealed direct messages.
    pub exchange_key: String,
    pub avatar: Option<MediaMeta>,
}

/// A membership group propagated through the group packet family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: ContentId,
    pub name: String,
    pub owner: IdentityId,
    pub members: BTreeSet<IdentityId>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A decrypted direct message persisted locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub from: IdentityId,
    pub to: IdentityId,
    pub body: String,
    pub sent_at: u64,
    pub read: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> IdentityId {
        IdentityId(s.to_string())
    }

    fn test_post() -> Post {
        Post::new(
            ContentId("post-1".to_string()),
            ident("alice"),
            "aa".to_string(),
            "hello mesh".to_string(),
            1000,
            Visibility::Public,
        )
    }

    #[test]
    fn test_vote_is_one_per_voter() {
        let mut post = test_post();
        assert!(post.cast_vote(ident("bob"), VoteDir::Up));
        assert!(post.cast_vote(ident("bob"), VoteDir::Down));
        // Same vote again: no change
        assert!(!post.cast_vote(ident("bob"), VoteDir::Down));
        assert_eq!(post.votes.len(), 1);
    }

    #[test]
    fn test_reaction_toggle() {
        let mut post = test_post();
        assert!(post.set_reaction("🔥", ident("bob"), true));
        assert!(!post.set_reaction("🔥", ident("bob"), true));
        assert!(post.set_reaction("🔥", ident("bob"), false));
        // Empty emoji buckets are dropped entirely
        assert!(post.reactions.is_empty());
    }

    #[test]
    fn test_mutations_move_the_hash() {
        let mut post = test_post();
        let initial = post.content_hash.clone();

        post.cast_vote(ident("bob"), VoteDir::Up);
        assert_ne!(post.content_hash, initial);

        let after_vote = post.content_hash.clone();
        post.set_reaction("👍", ident("carol"), true);
        assert_ne!(post.content_hash, after_vote);
    }

    #[test]
    fn test_signing_bytes_track_revision() {
        let mut post = test_post();
        let original = post.signing_bytes();

        post.content = "edited".to_string();
        post.edited_at = Some(2000);
        assert_ne!(post.signing_bytes(), original);
    }
}
