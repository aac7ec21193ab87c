//! Content fingerprinting.
//!
//! The fingerprint is a pure function of a post's mutable fields —
//! content, comments, votes, reactions — so two replicas holding the same
//! merged state always report the same hash, and a digest comparison can
//! detect staleness without transferring the content itself.

use crate::model::Post;

/// Compute the blake3 fingerprint of a post's mutable fields, hex-encoded.
///
/// Ordered maps and canonically ordered comment forests make the JSON
/// serialization deterministic; the derived `content_hash` field itself is
/// excluded.
pub fn fingerprint(post: &Post) -> String {
    let payload = serde_json::to_vec(&(
        &post.content,
        &post.edited_at,
        &post.votes,
        &post.reactions,
        &post.comments,
    ))
    .expect("fingerprint payload serializes");

    hex::encode(blake3::hash(&payload).as_bytes())
}
