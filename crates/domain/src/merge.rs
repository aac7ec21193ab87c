//! Deterministic union of divergent content replicas.
//!
//! `merge(local, incoming)` is pure, commutative, and associative on the
//! fields replicas can disagree about: comment forests union by id, vote
//! maps union per voter, reaction sets union per emoji. Nothing is ever
//! deleted by a merge — deletion is its own propagated, authenticated
//! event. Post content is resolved as a revision: highest edit timestamp
//! wins, ties broken by lexicographically greater content, so the outcome
//! cannot depend on merge order.

use crate::model::{Comment, Group, Post, VoteDir};
use crate::tree::MAX_COMMENT_DEPTH;
use std::collections::{BTreeMap, BTreeSet};
use veilmesh_core::IdentityId;

/// Merge two replicas of the same post into the canonical union.
///
/// Callers compare `content_hash` before and after to decide whether the
/// merged state needs persisting and re-announcing.
pub fn merge_posts(local: &Post, incoming: &Post) -> Post {
    debug_assert_eq!(local.id, incoming.id);

    let mut merged = local.clone();

    // Content is a revision, not a union: newest edit wins, with a
    // deterministic tiebreak so concurrent edits converge identically on
    // every replica. The signature travels with the winning revision.
    let local_key = (local.revision_ts(), local.content.as_str());
    let incoming_key = (incoming.revision_ts(), incoming.content.as_str());
    if incoming_key > local_key {
        merged.content = incoming.content.clone();
        merged.edited_at = incoming.edited_at;
        merged.signature = incoming.signature.clone();
    }

    merged.votes = merge_votes(&local.votes, &incoming.votes);
    merged.reactions = merge_reactions(&local.reactions, &incoming.reactions);
    merged.comments = merge_forests(&local.comments, &incoming.comments, 0);

    merged.refresh_hash();
    merged
}

/// Merge two replicas of the same group: member union plus latest rename.
pub fn merge_groups(local: &Group, incoming: &Group) -> Group {
    debug_assert_eq!(local.id, incoming.id);

    let mut merged = local.clone();
    merged.members = local.members.union(&incoming.members).cloned().collect();
    merged.created_at = local.created_at.min(incoming.created_at);
    merged.updated_at = local.updated_at.max(incoming.updated_at);

    if (incoming.updated_at, incoming.name.as_str()) > (local.updated_at, local.name.as_str()) {
        merged.name = incoming.name.clone();
    }
    merged
}

fn merge_votes(
    a: &BTreeMap<IdentityId, VoteDir>,
    b: &BTreeMap<IdentityId, VoteDir>,
) -> BTreeMap<IdentityId, VoteDir> {
    let mut merged = a.clone();
    for (voter, dir) in b {
        merged
            .entry(voter.clone())
            .and_modify(|existing| *existing = resolve_vote(*existing, *dir))
            .or_insert(*dir);
    }
    merged
}

/// Deterministic resolution for a voter seen with different directions on
/// the two replicas. Up absorbs Down so the outcome is order-independent.
fn resolve_vote(a: VoteDir, b: VoteDir) -> VoteDir {
    if a == b {
        a
    } else {
        VoteDir::Up
    }
}

fn merge_reactions(
    a: &BTreeMap<String, BTreeSet<IdentityId>>,
    b: &BTreeMap<String, BTreeSet<IdentityId>>,
) -> BTreeMap<String, BTreeSet<IdentityId>> {
    let mut merged = a.clone();
    for (emoji, voters) in b {
        merged
            .entry(emoji.clone())
            .or_default()
            .extend(voters.iter().cloned());
    }
    merged
}

/// Merge two comment forests by recursive id-union. Output ordering is
/// canonical (created_at, id) regardless of input order; levels beyond
/// the depth cap are dropped on both sides.
fn merge_forests(a: &[Comment], b: &[Comment], depth: usize) -> Vec<Comment> {
    if depth >= MAX_COMMENT_DEPTH {
        return Vec::new();
    }

    let b_by_id: BTreeMap<&str, &Comment> = b.iter().map(|c| (c.id.as_str(), c)).collect();
    let a_ids: BTreeSet<&str> = a.iter().map(|c| c.id.as_str()).collect();

    let mut merged: BTreeMap<(u64, String), Comment> = BTreeMap::new();
    for ca in a {
        let node = match b_by_id.get(ca.id.as_str()) {
            Some(cb) => merge_comment(ca, cb, depth),
            None => canonicalize(ca, depth),
        };
        merged.insert((node.created_at, node.id.clone()), node);
    }
    for cb in b {
        if !a_ids.contains(cb.id.as_str()) {
            let node = canonicalize(cb, depth);
            merged.insert((node.created_at, node.id.clone()), node);
        }
    }

    merged.into_values().collect()
}

fn merge_comment(a: &Comment, b: &Comment, depth: usize) -> Comment {
    let mut merged = a.clone();

    let a_key = (a.edited_at.unwrap_or(a.created_at), a.content.as_str());
    let b_key = (b.edited_at.unwrap_or(b.created_at), b.content.as_str());
    if b_key > a_key {
        merged.content = b.content.clone();
        merged.edited_at = b.edited_at;
    }

    merged.votes = merge_votes(&a.votes, &b.votes);
    merged.reactions = merge_reactions(&a.reactions, &b.reactions);
    merged.replies = merge_forests(&a.replies, &b.replies, depth + 1);
    merged
}

/// Re-order a single-replica subtree canonically and clamp its depth, so
/// merge output never depends on which side a comment arrived from.
fn canonicalize(comment: &Comment, depth: usize) -> Comment {
    let mut node = comment.clone();
    node.replies = if depth + 1 >= MAX_COMMENT_DEPTH {
        Vec::new()
    } else {
        let mut replies: BTreeMap<(u64, String), Comment> = BTreeMap::new();
        for reply in &comment.replies {
            let child = canonicalize(reply, depth + 1);
            replies.insert((child.created_at, child.id.clone()), child);
        }
        replies.into_values().collect()
    };
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;
    use crate::tree::insert_reply;
    use veilmesh_core::ContentId;

    fn ident(s: &str) -> IdentityId {
        IdentityId(s.to_string())
    }

    fn base_post() -> Post {
        Post::new(
            ContentId("p1".to_string()),
            ident("alice"),
            "aa".to_string(),
            "hello".to_string(),
            1000,
            Visibility::Public,
        )
    }

    fn comment(id: &str, created_at: u64) -> Comment {
        Comment::new(id.to_string(), ident("bob"), format!("body {id}"), created_at)
    }

    #[test]
    fn test_merge_is_commutative() {
        let mut a = base_post();
        a.cast_vote(ident("bob"), VoteDir::Up);
        insert_reply(&mut a.comments, None, comment("c1", 1100));

        let mut b = base_post();
        b.set_reaction("🔥", ident("carol"), true);
        insert_reply(&mut b.comments, None, comment("c2", 1200));

        let ab = merge_posts(&a, &b);
        let ba = merge_posts(&b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab.content_hash, ba.content_hash);
    }

    #[test]
    fn test_merge_is_associative() {
        let mut a = base_post();
        a.cast_vote(ident("bob"), VoteDir::Up);
        insert_reply(&mut a.comments, None, comment("c1", 1100));
        insert_reply(&mut a.comments, Some("c1"), comment("c1r", 1150));

        let mut b = base_post();
        b.cast_vote(ident("bob"), VoteDir::Down);
        b.set_reaction("🔥", ident("carol"), true);
        insert_reply(&mut b.comments, None, comment("c2", 1200));

        let mut c = base_post();
        c.content = "hello, edited".to_string();
        c.edited_at = Some(2000);
        insert_reply(&mut c.comments, Some("c1"), comment("c1r", 1150));
        insert_reply(&mut c.comments, None, comment("c1", 1100));

        let left = merge_posts(&merge_posts(&a, &b), &c);
        let right = merge_posts(&a, &merge_posts(&b, &c));
        assert_eq!(left, right);
        assert_eq!(left.content_hash, right.content_hash);
    }

    #[test]
    fn test_merge_never_deletes() {
        let mut a = base_post();
        insert_reply(&mut a.comments, None, comment("c1", 1100));

        let b = base_post(); // b never saw c1

        let merged = merge_posts(&b, &a);
        assert!(merged.comments.iter().any(|c| c.id == "c1"));
    }

    #[test]
    fn test_newest_edit_wins() {
        let mut a = base_post();
        a.content = "first edit".to_string();
        a.edited_at = Some(1500);

        let mut b = base_post();
        b.content = "second edit".to_string();
        b.edited_at = Some(1600);

        let merged = merge_posts(&a, &b);
        assert_eq!(merged.content, "second edit");
        assert_eq!(merged.edited_at, Some(1600));
    }

    #[test]
    fn test_concurrent_edit_tiebreak_is_symmetric() {
        let mut a = base_post();
        a.content = "apple".to_string();
        a.edited_at = Some(1500);

        let mut b = base_post();
        b.content = "banana".to_string();
        b.edited_at = Some(1500);

        let ab = merge_posts(&a, &b);
        let ba = merge_posts(&b, &a);
        assert_eq!(ab.content, ba.content);
        assert_eq!(ab.content, "banana");
    }

    #[test]
    fn test_conflicting_votes_resolve_deterministically() {
        let mut a = base_post();
        a.cast_vote(ident("bob"), VoteDir::Up);

        let mut b = base_post();
        b.cast_vote(ident("bob"), VoteDir::Down);

        let ab = merge_posts(&a, &b);
        let ba = merge_posts(&b, &a);
        assert_eq!(ab.votes.get(&ident("bob")), ba.votes.get(&ident("bob")));
    }

    #[test]
    fn test_reactions_union() {
        let mut a = base_post();
        a.set_reaction("🔥", ident("bob"), true);

        let mut b = base_post();
        b.set_reaction("🔥", ident("carol"), true);
        b.set_reaction("👍", ident("dave"), true);

        let merged = merge_posts(&a, &b);
        assert_eq!(merged.reactions["🔥"].len(), 2);
        assert_eq!(merged.reactions["👍"].len(), 1);
    }

    #[test]
    fn test_nested_comment_merge_converges() {
        let mut a = base_post();
        insert_reply(&mut a.comments, None, comment("root", 1100));
        insert_reply(&mut a.comments, Some("root"), comment("reply-a", 1200));

        let mut b = base_post();
        insert_reply(&mut b.comments, None, comment("root", 1100));
        insert_reply(&mut b.comments, Some("root"), comment("reply-b", 1300));

        let merged = merge_posts(&a, &b);
        let root = merged.comments.iter().find(|c| c.id == "root").unwrap();
        let reply_ids: Vec<&str> = root.replies.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(reply_ids, vec!["reply-a", "reply-b"]);
    }

    #[test]
    fn test_group_merge_unions_members() {
        let mut a = Group {
            id: ContentId("g1".to_string()),
            name: "old name".to_string(),
            owner: ident("alice"),
            members: BTreeSet::new(),
            created_at: 100,
            updated_at: 100,
        };
        a.members.insert(ident("alice"));
        a.members.insert(ident("bob"));

        let mut b = a.clone();
        b.members.insert(ident("carol"));
        b.name = "new name".to_string();
        b.updated_at = 200;

        let merged = merge_groups(&a, &b);
        assert_eq!(merged.members.len(), 3);
        assert_eq!(merged.name, "new name");
        assert_eq!(merged, merge_groups(&b, &a));
    }
}
