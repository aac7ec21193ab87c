//! Firewall and handshake boundary behavior.

use crate::test_utils::TestNet;
use veilmesh_core::{ContentId, CryptoProvider, IdentityId, MeshCrypto};
use veilmesh_domain::Visibility;
use veilmesh_mesh::{connection_signing_bytes, Notification, Packet, Payload};

/// A connection request signed by a different key than the claimed
/// identity is rejected before any contact or notification state moves.
#[test]
fn test_forged_connection_request_changes_nothing() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let mallory = net.add_node("mallory");

    let victim_key = MeshCrypto::generate();
    let attacker_key = MeshCrypto::generate();

    // Claim the victim's identity, sign with the attacker's key
    let claimed_identity = IdentityId(hex::encode(victim_key.public_key()));
    let public_key = hex::encode(victim_key.public_key());
    let exchange_key = hex::encode(attacker_key.exchange_key());
    let sent_at = net.now;
    let payload = connection_signing_bytes(
        &claimed_identity,
        &public_key,
        &exchange_key,
        &mallory,
        sent_at,
    );
    let signature = hex::encode(attacker_key.sign(&payload));

    let packet = Packet::new(
        Payload::ConnectionRequest {
            identity: claimed_identity,
            alias: "totally alice".to_string(),
            public_key,
            exchange_key,
            address: mallory.clone(),
            message: "trust me".to_string(),
            sent_at,
            signature,
        },
        0,
        mallory.clone(),
    );

    let peers_before = net.engine_ref(&a).peers().peer_count();
    let now = net.now;
    net.engine(&a).handle_packet(packet, mallory, false, now);

    assert_eq!(net.engine_ref(&a).peers().peer_count(), peers_before);
    assert!(net
        .engine(&a)
        .drain_notifications()
        .iter()
        .all(|n| !matches!(n, Notification::ConnectionRequested { .. })));
}

/// Non-allow-listed packets from untrusted senders never reach a
/// handler: no state change, no reply that would confirm existence.
#[test]
fn test_untrusted_sender_is_silently_dropped() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let stranger = net.add_node("stranger");

    let packet = Packet::new(
        Payload::ContentFetch {
            content_id: ContentId("anything".to_string()),
        },
        0,
        stranger.clone(),
    );
    let now = net.now;
    net.engine(&a).handle_packet(packet, stranger.clone(), false, now);

    // No reply of any kind
    assert!(net.engine(&a).drain_outbox().is_empty());
    // And the stranger was not even recorded as a peer
    assert!(net.engine_ref(&a).peers().get(&stranger).is_none());
}

/// The legitimate handshake: request, notify, accept, then sealed
/// direct messages flow between the two identities.
#[test]
fn test_handshake_then_direct_message() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");

    let now = net.now;
    net.engine(&a)
        .request_connection(b.clone(), "hi, it's alice".to_string(), now);
    net.pump();

    let requested = net
        .engine(&b)
        .drain_notifications()
        .into_iter()
        .find_map(|n| match n {
            Notification::ConnectionRequested { address, .. } => Some(address),
            _ => None,
        })
        .expect("bob sees the request");

    let now = net.now;
    net.engine(&b).accept_connection(&requested, now).unwrap();
    net.pump();

    // Both sides now hold each other's identity and exchange key
    let bob_identity = net.engine_ref(&b).identity().clone();
    let message_id = net
        .engine(&a)
        .send_direct(&bob_identity, "first sealed message".to_string(), now)
        .unwrap();
    net.pump();

    let received = net.engine_ref(&b).messages();
    let message = received
        .iter()
        .find(|m| m.id == message_id)
        .expect("bob decrypted the message");
    assert_eq!(message.body, "first sealed message");
    assert!(!message.read);
}

/// Blocked peers stay blocked even for allow-listed kinds.
#[test]
fn test_blocked_peer_cannot_use_allow_list() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let enemy = net.add_node("enemy");

    let now = net.now;
    net.engine(&a).block_peer(&enemy, now);

    let media_id = ContentId("m1".to_string());
    net.engine(&a).store_media(&media_id, &[1, 2, 3], "token").unwrap();

    let packet = Packet::new(
        Payload::ChunkRequest {
            content_id: media_id,
            index: 0,
            chunk_size: 1024,
            access_key: "token".to_string(),
        },
        0,
        enemy.clone(),
    );
    let now = net.now;
    net.engine(&a).handle_packet(packet, enemy, false, now);
    assert!(net.engine(&a).drain_outbox().is_empty());
}

/// Untrusted senders CAN use the capability-gated chunk path — that is
/// the point of the allow-list — but only with a valid token.
#[test]
fn test_capability_token_gates_chunk_service() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let stranger = net.add_node("stranger");

    let media_id = ContentId("m1".to_string());
    net.engine(&a)
        .store_media(&media_id, &[7u8; 64], "secret-token")
        .unwrap();

    // Wrong token: silence
    let bad = Packet::new(
        Payload::ChunkRequest {
            content_id: media_id.clone(),
            index: 0,
            chunk_size: 32,
            access_key: "wrong".to_string(),
        },
        0,
        stranger.clone(),
    );
    let now = net.now;
    net.engine(&a).handle_packet(bad, stranger.clone(), false, now);
    assert!(net.engine(&a).drain_outbox().is_empty());

    // Right token: one chunk comes back
    let good = Packet::new(
        Payload::ChunkRequest {
            content_id: media_id,
            index: 0,
            chunk_size: 32,
            access_key: "secret-token".to_string(),
        },
        0,
        stranger.clone(),
    );
    let now = net.now;
    net.engine(&a).handle_packet(good, stranger, false, now);

    let out = net.engine(&a).drain_outbox();
    assert_eq!(out.len(), 1);
    assert!(matches!(out[0].packet.payload, Payload::ChunkResponse { .. }));
}

/// Gossip visibility: an untrusted node on the same hub learns nothing
/// about published content.
#[test]
fn test_strangers_hear_no_broadcasts() {
    let mut net = TestNet::new();
    let a = net.add_node("alice");
    let b = net.add_node("bob");
    let stranger = net.add_node("stranger");

    net.trust_both(&a, &b);

    net.engine(&a)
        .publish_post("members only mesh".to_string(), Visibility::Public, None, 1_000)
        .unwrap();
    net.pump();

    assert_eq!(net.engine_ref(&b).status().post_count, 1);
    assert_eq!(net.engine_ref(&stranger).status().post_count, 0);
}
