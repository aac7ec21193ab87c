//! Content model for the veilmesh social mesh.
//!
//! Broadcasts (posts with threaded comments, votes, reactions), identity
//! profiles, groups, and direct messages — plus the two operations every
//! replica must agree on: the content fingerprint and the deterministic
//! merge of divergent replicas.

pub mod error;
pub mod hash;
pub mod merge;
pub mod model;
pub mod tree;

pub use error::{DomainError, DomainResult};
pub use hash::fingerprint;
pub use merge::{merge_groups, merge_posts};
pub use model::{
    ChatMessage, Comment, Group, MediaMeta, Post, Profile, Visibility, VoteDir,
};
pub use tree::{find_node, insert_reply, update_node, MAX_COMMENT_DEPTH};
