//! End-to-end scenario tests (spec §8, S1-S4) exercised through the
//! public `ProtocolSystem` facade rather than the internal `Session`
//! type directly. OPAQUE's S5/S6 (wrong-password / correct-password
//! login) are covered as inline tests in `ecliptix_crypto::opaque`,
//! since the server-side OPRF/AKE math they need to mirror is internal
//! to that module and not part of this crate's public surface.

use std::time::Instant;

use ecliptix_crypto::config::Config;
use ecliptix_crypto::error::EcliptixError;
use ecliptix_crypto::identity::IdentityKeys;
use ecliptix_crypto::registry::ExchangeKind;
use ecliptix_crypto::session::Session;
use ecliptix_crypto::protocol::ProtocolSystem;

async fn linked_systems() -> (ProtocolSystem, ProtocolSystem, u32, ExchangeKind) {
    let alice = ProtocolSystem::new(IdentityKeys::generate(2), &Config::default());
    let bob = ProtocolSystem::new(IdentityKeys::generate(2), &Config::default());
    let kind = ExchangeKind::new("s8-scenario");

    let (session_id, init) = alice.begin_exchange(kind.clone()).await.unwrap();
    let (response, _bob_root_key) = bob.respond_to_exchange(session_id, kind.clone(), &init).await.unwrap();
    alice.complete_exchange(session_id, kind.clone(), &response).await.unwrap();

    (alice, bob, session_id, kind)
}

/// S1: handshake completes and a single message round-trips.
#[tokio::test]
async fn s1_handshake_and_single_message() {
    let (alice, bob, session_id, kind) = linked_systems().await;

    let envelope = alice.send(session_id, kind.clone(), b"hello").await.unwrap();
    assert_eq!(envelope.ratchet_index, 1);

    let plaintext = bob.receive(session_id, kind, &envelope).await.unwrap();
    assert_eq!(plaintext, b"hello");
}

/// S2: the 10th message carries a new DH public key; messages 1..9 do not.
#[tokio::test]
async fn s2_ratchet_trigger_on_tenth_message() {
    let (alice, bob, session_id, kind) = linked_systems().await;

    let mut envelopes = Vec::new();
    for i in 0..10 {
        let envelope = alice.send(session_id, kind.clone(), format!("msg-{i}").as_bytes()).await.unwrap();
        envelopes.push(envelope);
    }

    for (i, envelope) in envelopes.iter().enumerate() {
        if i == 9 {
            assert!(envelope.dh_public.is_some(), "10th envelope must carry a new DH public key");
        } else {
            assert!(envelope.dh_public.is_none(), "envelope {i} must not carry a DH public key");
        }
    }

    for envelope in &envelopes {
        bob.receive(session_id, kind.clone(), envelope).await.unwrap();
    }
}

/// S3: out-of-order delivery recovers every plaintext, and a second
/// delivery of an already-processed index is rejected.
#[tokio::test]
async fn s3_out_of_order_delivery_and_replay_rejection() {
    let (alice, bob, session_id, kind) = linked_systems().await;

    let mut envelopes = Vec::new();
    for label in ["one", "two", "three", "four", "five"] {
        envelopes.push(alice.send(session_id, kind.clone(), label.as_bytes()).await.unwrap());
    }

    let order = [2, 0, 4, 1, 3];
    let expected = ["three", "one", "five", "two", "four"];
    for (&idx, expect) in order.iter().zip(expected.iter()) {
        let plaintext = bob.receive(session_id, kind.clone(), &envelopes[idx]).await.unwrap();
        assert_eq!(plaintext, expect.as_bytes());
    }

    let replay = bob.receive(session_id, kind.clone(), &envelopes[0]).await;
    assert!(matches!(replay, Err(EcliptixError::OutOfOrderPast)));
}

/// S4: a session older than its TTL rejects `prepare_send`.
#[test]
fn s4_expired_session_rejects_send() {
    let mut alice_ik = IdentityKeys::generate(1);
    let bob_ik = IdentityKeys::generate(1);
    alice_ik.generate_ephemeral();

    let bob_bundle = bob_ik.public_bundle();
    let opk_id = bob_bundle.one_time_prekeys[0].id;
    let alice_bundle = alice_ik.public_bundle();

    let root_key_alice = alice_ik.x3dh_as_initiator(&bob_bundle, b"Ecliptix_X3DH").unwrap();
    let root_key_bob = bob_ik
        .x3dh_as_responder(&alice_bundle.identity_x25519, &alice_bundle.ephemeral_x25519.unwrap(), Some(opk_id), b"Ecliptix_X3DH")
        .unwrap();

    let mut alice = Session::create(1, alice_bundle.identity_x25519, true, Config::default()).unwrap();
    let (_, bob_initial_dh) = ecliptix_crypto::primitives::x25519_keypair();
    alice.finalize(root_key_alice, bob_initial_dh, bob_bundle).unwrap();

    let _ = root_key_bob;

    let far_future = Instant::now() + std::time::Duration::from_secs(24 * 60 * 60 + 1);
    assert!(matches!(alice.prepare_send_at(b"too late", far_future), Err(EcliptixError::SessionExpired)));
}
