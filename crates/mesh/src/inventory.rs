//! Inventory digests: compact divergence detection.
//!
//! A digest is a window of recent (id, content hash) pairs. Comparing a
//! peer's digest against local content yields exactly the items they are
//! missing or hold stale — the periodic reconciliation that closes the
//! gap continuous gossip leaves open.

use crate::packet::DigestEntry;
use std::collections::HashMap;
use veilmesh_core::ContentId;
use veilmesh_domain::{Post, Visibility};

/// Build a digest of the most recent `window` posts.
pub fn build_digest(posts: &HashMap<ContentId, Post>, window: usize) -> Vec<DigestEntry> {
    let mut recent: Vec<&Post> = posts.values().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    recent
        .into_iter()
        .take(window)
        .map(|post| DigestEntry {
            id: post.id.clone(),
            content_hash: post.content_hash.clone(),
        })
        .collect()
}

/// Select the local posts a requester needs, given their digest: every
/// post visible to them that their digest lacks or reports with a
/// different hash.
pub fn select_updates(
    posts: &HashMap<ContentId, Post>,
    their_digest: &[DigestEntry],
    requester_is_connection: bool,
) -> Vec<Post> {
    let theirs: HashMap<&ContentId, &str> = their_digest
        .iter()
        .map(|entry| (&entry.id, entry.content_hash.as_str()))
        .collect();

    posts
        .values()
        .filter(|post| {
            requester_is_connection || post.visibility == Visibility::Public
        })
        .filter(|post| theirs.get(&post.id) != Some(&post.content_hash.as_str()))
        .cloned()
        .collect()
}
