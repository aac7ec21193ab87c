//! Content convergence across nodes that are not all directly connected.

use crate::test_utils::TestNet;
use veilmesh_domain::{Visibility, VoteDir};

/// A publishes; B (trusted by A) pulls and re-announces; C (trusted by
/// B, unknown to A) pulls from B and verifies A's embedded signature.
/// All three replicas converge to one content hash.
#[test]
fn test_three_node_convergence() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    let c = net.add_node("carol");

    net.trust_both(&a, &b);
    net.trust_both(&b, &c);

    let post_id = net
        .engine(&a)
        .publish_post("hello".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.pump();

    let hash_a = net.engine_ref(&a).post(&post_id).unwrap().content_hash.clone();
    let hash_b = net
        .engine_ref(&b)
        .post(&post_id)
        .expect("bob replicated the post")
        .content_hash
        .clone();
    let hash_c = net
        .engine_ref(&c)
        .post(&post_id)
        .expect("carol replicated the post via bob")
        .content_hash
        .clone();

    assert_eq!(hash_a, hash_b);
    assert_eq!(hash_b, hash_c);
}

/// Concurrent divergent mutations (a vote on one node, a comment on
/// another) merge to identical state everywhere.
#[test]
fn test_divergent_mutations_converge() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    let c = net.add_node("carol");

    net.trust_both(&a, &b);
    net.trust_both(&b, &c);
    net.trust_both(&a, &c);

    let post_id = net
        .engine(&a)
        .publish_post("debate me".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.pump();
    assert!(net.engine_ref(&c).post(&post_id).is_some());

    // Divergence: B votes while C comments, before either propagates
    net.engine(&b).vote_post(&post_id, VoteDir::Up).unwrap();
    net.engine(&c)
        .comment_post(&post_id, None, "strong words".to_string(), 2_000)
        .unwrap();
    net.pump();

    let post_a = net.engine_ref(&a).post(&post_id).unwrap().clone();
    let post_b = net.engine_ref(&b).post(&post_id).unwrap().clone();
    let post_c = net.engine_ref(&c).post(&post_id).unwrap().clone();

    assert_eq!(post_a.content_hash, post_b.content_hash);
    assert_eq!(post_b.content_hash, post_c.content_hash);
    assert_eq!(post_a.votes.len(), 1);
    assert_eq!(post_a.comments.len(), 1);
}

/// A peer that missed announcements catches up through the periodic
/// inventory digest exchange, and re-announces what it learned.
#[test]
fn test_inventory_sync_repairs_missed_content() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    net.trust_both(&a, &b);

    // B never hears the announcements
    net.engine(&a)
        .publish_post("first".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.engine(&a)
        .publish_post("second".to_string(), Visibility::Public, None, 1_100)
        .unwrap();
    net.drop_outbox(&a);

    assert_eq!(net.engine_ref(&b).status().post_count, 0);

    // Hourly reconciliation closes the gap
    let now = net.now;
    net.engine(&b).tick_inventory(now);
    net.pump();

    assert_eq!(net.engine_ref(&b).status().post_count, 2);
}

/// Connections-only content is withheld from inventory answers to
/// peers outside the trust circle, but served to connections.
#[test]
fn test_private_content_stays_in_circle() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    net.trust_both(&a, &b);

    net.engine(&a)
        .publish_post(
            "for friends only".to_string(),
            Visibility::ConnectionsOnly,
            None,
            1_000,
        )
        .unwrap();
    net.pump();

    assert_eq!(net.engine_ref(&b).status().post_count, 1);
}

/// Deletion is an authenticated propagated event: the author's delete
/// removes the replica on peers too.
#[test]
fn test_delete_propagates() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    net.trust_both(&a, &b);

    let post_id = net
        .engine(&a)
        .publish_post("regret".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.pump();
    assert!(net.engine_ref(&b).post(&post_id).is_some());

    net.engine(&a).delete_post(&post_id, 2_000).unwrap();
    net.pump();

    assert!(net.engine_ref(&a).post(&post_id).is_none());
    assert!(net.engine_ref(&b).post(&post_id).is_none());
}

/// An author's edit overrides older content everywhere, via the
/// re-signed edit event.
#[test]
fn test_edit_propagates_and_wins() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    net.trust_both(&a, &b);

    let post_id = net
        .engine(&a)
        .publish_post("draft".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.pump();

    net.engine(&a)
        .edit_post(&post_id, "final".to_string(), 2_000)
        .unwrap();
    net.pump();

    let post_b = net.engine_ref(&b).post(&post_id).unwrap();
    assert_eq!(post_b.content, "final");
    assert_eq!(
        post_b.content_hash,
        net.engine_ref(&a).post(&post_id).unwrap().content_hash
    );
}

/// Group lifecycle: invite lands at the member, divergent member
/// additions merge by union, owner deletion propagates.
#[test]
fn test_group_invite_update_and_delete() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");

    // Full handshake so identities and home addresses are bound
    let now = net.now;
    net.engine(&a).request_connection(b.clone(), String::new(), now);
    net.pump();
    let now = net.now;
    net.engine(&b).accept_connection(&a, now).unwrap();
    net.pump();

    let bob_identity = net.engine_ref(&b).identity().clone();
    let now = net.now;
    let group_id = net
        .engine(&a)
        .create_group("reading circle".to_string(), vec![bob_identity.clone()], now);
    net.pump();

    let group_at_b = net
        .engine_ref(&b)
        .group(&group_id)
        .expect("bob received the invite")
        .clone();
    assert!(group_at_b.members.contains(&bob_identity));

    // Bob renames and re-propagates; Alice's replica follows
    let mut renamed = group_at_b;
    renamed.name = "book club".to_string();
    renamed.updated_at = net.now + 1;
    net.engine(&b).update_group(renamed).unwrap();
    net.pump();
    assert_eq!(net.engine_ref(&a).group(&group_id).unwrap().name, "book club");

    // Only the owner's delete sticks
    net.engine(&a).delete_group(&group_id).unwrap();
    net.pump();
    assert!(net.engine_ref(&a).group(&group_id).is_none());
    assert!(net.engine_ref(&b).group(&group_id).is_none());
}
