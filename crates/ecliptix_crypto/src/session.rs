//! The Double Ratchet session: root key, sending/receiving chain steps,
//! nonce counter, and the `Init -> Pending -> Complete` state machine.
//!
//! Only `Complete` sessions accept `prepare_send`/`process_receive`;
//! `finalize` additionally accepts `Init`/`Pending`.

use std::time::{Duration, Instant};

use crate::chain_step::{ChainKind, ChainStep};
use crate::config::Config;
use crate::error::{EcliptixError, Result};
use crate::identity::{public_from_secret, IdentityBundle};
use crate::primitives::{self, AEAD_NONCE_LEN, AEAD_TAG_LEN};
use crate::secure_buffer::SecureBuffer;

const CHAIN_INIT_SEND_INFO: &[u8] = b"EcliptixInitSend";
const CHAIN_INIT_RECV_INFO: &[u8] = b"EcliptixInitRecv";
const DH_RATCHET_INFO: &[u8] = b"EcliptixDhRatchet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Pending,
    Complete,
}

/// An outbound or inbound session message. Wire field names follow spec
/// §6 exactly; `ecliptix_proto::envelope::Envelope` is the serializable
/// projection of this type.
#[derive(Debug, Clone)]
pub struct SessionEnvelope {
    pub ratchet_index: u32,
    pub nonce: [u8; AEAD_NONCE_LEN],
    /// Ciphertext with the 16-byte GCM tag appended.
    pub cipher: Vec<u8>,
    pub dh_public: Option<[u8; 32]>,
    pub created_at: std::time::SystemTime,
}

pub struct Session {
    pub id: u32,
    pub is_initiator: bool,
    state: SessionState,

    root_key: Option<SecureBuffer>,
    send_chain: ChainStep,
    recv_chain: Option<ChainStep>,
    /// The "persistent" receiving-side DH keypair generated at `create`
    /// time, held here until `finalize` builds the receiving chain step.
    pending_recv_dh: Option<([u8; 32], [u8; 32])>,

    peer_dh_public: Option<[u8; 32]>,
    has_done_recv_ratchet: bool,
    received_new_dh_key: bool,

    nonce_counter: u64,
    created_at: Instant,
    peer_bundle: Option<IdentityBundle>,

    local_identity_x: [u8; 32],
    peer_identity_x: Option<[u8; 32]>,

    config: Config,
}

impl Session {
    /// Generate the initial sending DH keypair (installed on the sender
    /// chain immediately) and the persistent receiving-side DH keypair
    /// (installed on the receiving chain at `finalize` time).
    pub fn create(id: u32, local_identity_x: [u8; 32], is_initiator: bool, config: Config) -> Result<Self> {
        let (send_dh_sk, send_dh_pk) = primitives::x25519_keypair();
        let (recv_dh_sk, recv_dh_pk) = primitives::x25519_keypair();

        let send_chain = ChainStep::create(
            ChainKind::Sender,
            [0u8; 32],
            Some(send_dh_sk),
            Some(send_dh_pk),
            Some(config.cache_window),
        )?;

        Ok(Self {
            id,
            is_initiator,
            state: SessionState::Init,
            root_key: None,
            send_chain,
            recv_chain: None,
            pending_recv_dh: Some((recv_dh_sk, recv_dh_pk)),
            peer_dh_public: None,
            has_done_recv_ratchet: false,
            received_new_dh_key: false,
            nonce_counter: 0,
            created_at: Instant::now(),
            peer_bundle: None,
            local_identity_x,
            peer_identity_x: None,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_pending(&mut self) {
        if self.state == SessionState::Init {
            self.state = SessionState::Pending;
        }
    }

    pub fn sender_dh_public(&self) -> [u8; 32] {
        self.send_chain.dh_public().expect("sender chain always carries a DH keypair")
    }

    /// Derive both child chains from `root_key`, assign sender/receiver
    /// per initiator/responder role, and install the persistent
    /// receiving DH keypair. May be called from `Init` or `Pending`.
    pub fn finalize(
        &mut self,
        root_key: [u8; 32],
        peer_initial_dh_public: [u8; 32],
        peer_bundle: IdentityBundle,
    ) -> Result<()> {
        if self.state == SessionState::Complete {
            return Err(EcliptixError::InvalidInput("session already finalized".into()));
        }

        let ck_a = {
            let mut out = [0u8; 32];
            out.copy_from_slice(&primitives::hkdf_expand(&root_key, CHAIN_INIT_SEND_INFO, 32)?);
            out
        };
        let ck_b = {
            let mut out = [0u8; 32];
            out.copy_from_slice(&primitives::hkdf_expand(&root_key, CHAIN_INIT_RECV_INFO, 32)?);
            out
        };

        let (send_ck, recv_ck) = if self.is_initiator { (ck_a, ck_b) } else { (ck_b, ck_a) };

        self.send_chain.update_after_dh_ratchet(send_ck, None, None)?;
        self.send_chain.clear_new_chain_flag();

        let (recv_dh_sk, recv_dh_pk) = self
            .pending_recv_dh
            .take()
            .expect("create() always populates pending_recv_dh before finalize");
        self.recv_chain = Some(ChainStep::create(
            ChainKind::Receiver,
            recv_ck,
            Some(recv_dh_sk),
            Some(recv_dh_pk),
            Some(self.config.cache_window),
        )?);

        self.peer_dh_public = Some(peer_initial_dh_public);
        self.peer_identity_x = Some(peer_bundle.identity_x25519);
        self.peer_bundle = Some(peer_bundle);
        self.root_key = Some(SecureBuffer::from_vec(root_key.to_vec()));
        self.state = SessionState::Complete;
        Ok(())
    }

    fn root_key_bytes(&self) -> Result<[u8; 32]> {
        let buf = self.root_key.as_ref().ok_or(EcliptixError::NotReady)?;
        let mut out = [0u8; 32];
        buf.read(&mut out).expect("root key is always 32 bytes");
        Ok(out)
    }

    fn check_usable(&self, now: Instant) -> Result<()> {
        if self.state != SessionState::Complete {
            return Err(EcliptixError::NotReady);
        }
        if now.saturating_duration_since(self.created_at) > self.config.session_ttl {
            return Err(EcliptixError::SessionExpired);
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.config.session_ttl
    }

    fn derive_ratchet_okm(&self, dh_output: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
        let root_key = self.root_key_bytes()?;
        let prk = primitives::hkdf_extract(Some(&root_key), dh_output);
        let okm = primitives::hkdf_expand(&prk, DH_RATCHET_INFO, 64)?;
        let mut new_root = [0u8; 32];
        let mut new_chain = [0u8; 32];
        new_root.copy_from_slice(&okm[..32]);
        new_chain.copy_from_slice(&okm[32..]);
        Ok((new_root, new_chain))
    }

    /// Encrypt `plaintext`, performing a sender DH ratchet first if the
    /// cadence or a deferred peer-key observation calls for one. Uses the
    /// wall clock; see `prepare_send_at` for the testable variant.
    pub fn prepare_send(&mut self, plaintext: &[u8]) -> Result<SessionEnvelope> {
        self.prepare_send_at(plaintext, Instant::now())
    }

    pub fn prepare_send_at(&mut self, plaintext: &[u8], now: Instant) -> Result<SessionEnvelope> {
        self.check_usable(now)?;

        let current_send_index = self.send_chain.current_index();
        let at_interval = (current_send_index + 1) % self.config.dh_rotation_interval == 0;
        let should_ratchet = at_interval || self.received_new_dh_key;

        let mut dh_public_for_envelope = None;
        if should_ratchet {
            let peer_dh = self.peer_dh_public.ok_or_else(|| {
                EcliptixError::DhRatchetFailed("no peer DH public key on record".into())
            })?;
            let (new_sk, new_pk) = primitives::x25519_keypair();
            let mut dh = primitives::x25519_dh(&new_sk, &peer_dh);
            let (new_root, new_chain) = self.derive_ratchet_okm(&dh)?;
            dh.fill(0);

            self.root_key = Some(SecureBuffer::from_vec(new_root.to_vec()));
            self.send_chain
                .update_after_dh_ratchet(new_chain, Some(new_sk), Some(new_pk))?;
            self.received_new_dh_key = false;
            dh_public_for_envelope = Some(new_pk);
        }

        let target_index = self.send_chain.current_index() + 1;
        let message_key = self.send_chain.derive_key(target_index)?;

        let mut nonce = [0u8; AEAD_NONCE_LEN];
        nonce[..8].copy_from_slice(&primitives::random_bytes(8));
        nonce[8..].copy_from_slice(&(self.nonce_counter as u32).to_le_bytes());
        self.nonce_counter += 1;

        let ad = self.outbound_ad()?;
        let (ct, tag) = primitives::aead_seal(&message_key, &nonce, &ad, plaintext)?;
        let mut cipher = ct;
        cipher.extend_from_slice(&tag);

        tracing::debug!(session_id = self.id, ratchet_index = target_index, ratcheted = should_ratchet, "prepare_send");

        Ok(SessionEnvelope {
            ratchet_index: target_index,
            nonce,
            cipher,
            dh_public: dh_public_for_envelope,
            created_at: std::time::SystemTime::now(),
        })
    }

    /// Decrypt `envelope`, performing a receiving DH ratchet (or deferring
    /// it) as required by the observed `dh_public`.
    pub fn process_receive(&mut self, envelope: &SessionEnvelope) -> Result<Vec<u8>> {
        self.process_receive_at(envelope, Instant::now())
    }

    pub fn process_receive_at(&mut self, envelope: &SessionEnvelope, now: Instant) -> Result<Vec<u8>> {
        self.check_usable(now)?;

        if envelope.cipher.len() < AEAD_TAG_LEN {
            return Err(EcliptixError::MalformedEnvelope("cipher shorter than AEAD tag".into()));
        }

        if let Some(incoming_dh) = envelope.dh_public {
            let differs = self.peer_dh_public.map(|cur| cur != incoming_dh).unwrap_or(true);
            if differs {
                let recv_chain = self.recv_chain.as_ref().ok_or(EcliptixError::NotReady)?;
                let current_recv_index = recv_chain.current_index();
                let at_interval = (current_recv_index + 1) % self.config.dh_rotation_interval == 0;

                if !self.has_done_recv_ratchet || at_interval {
                    let recv_dh_secret = recv_chain
                        .dh_secret_bytes()
                        .ok_or_else(|| EcliptixError::DhRatchetFailed("receiving chain has no DH secret".into()))?;
                    let mut dh = primitives::x25519_dh(&recv_dh_secret, &incoming_dh);
                    let (new_root, new_chain) = self.derive_ratchet_okm(&dh)?;
                    dh.fill(0);

                    self.root_key = Some(SecureBuffer::from_vec(new_root.to_vec()));
                    self.recv_chain
                        .as_mut()
                        .unwrap()
                        .update_after_dh_ratchet(new_chain, None, None)?;
                    self.peer_dh_public = Some(incoming_dh);
                    self.has_done_recv_ratchet = true;
                    self.received_new_dh_key = false;
                } else {
                    self.peer_dh_public = Some(incoming_dh);
                    self.received_new_dh_key = true;
                }
            }
        }

        let recv_chain = self.recv_chain.as_mut().ok_or(EcliptixError::NotReady)?;
        let message_key = recv_chain.derive_key(envelope.ratchet_index)?;

        let split = envelope.cipher.len() - AEAD_TAG_LEN;
        let (ct, tag_slice) = envelope.cipher.split_at(split);
        let mut tag = [0u8; AEAD_TAG_LEN];
        tag.copy_from_slice(tag_slice);

        let ad = self.inbound_ad()?;
        let plaintext = primitives::aead_open(&message_key, &envelope.nonce, &ad, ct, &tag)?;

        tracing::debug!(session_id = self.id, ratchet_index = envelope.ratchet_index, "process_receive");
        Ok(plaintext)
    }

    fn outbound_ad(&self) -> Result<Vec<u8>> {
        let peer_x = self.peer_identity_x.ok_or(EcliptixError::NotReady)?;
        let mut ad = Vec::with_capacity(64);
        ad.extend_from_slice(&self.local_identity_x);
        ad.extend_from_slice(&peer_x);
        Ok(ad)
    }

    fn inbound_ad(&self) -> Result<Vec<u8>> {
        let peer_x = self.peer_identity_x.ok_or(EcliptixError::NotReady)?;
        let mut ad = Vec::with_capacity(64);
        ad.extend_from_slice(&peer_x);
        ad.extend_from_slice(&self.local_identity_x);
        Ok(ad)
    }
}

/// Derive an X25519 public key from a freshly generated secret. Exposed
/// for callers constructing handshake messages outside `IdentityKeys`.
pub fn derive_public(sk: &[u8; 32]) -> [u8; 32] {
    public_from_secret(sk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeys;

    fn linked_sessions() -> (Session, Session) {
        let mut alice_ik = IdentityKeys::generate(1);
        let bob_ik = IdentityKeys::generate(1);
        alice_ik.generate_ephemeral();

        let bob_bundle = bob_ik.public_bundle();
        let opk_id = bob_bundle.one_time_prekeys[0].id;
        let alice_bundle = alice_ik.public_bundle();

        let root_key_alice = alice_ik.x3dh_as_initiator(&bob_bundle, b"Ecliptix_X3DH").unwrap();
        let root_key_bob = bob_ik
            .x3dh_as_responder(
                &alice_bundle.identity_x25519,
                &alice_bundle.ephemeral_x25519.unwrap(),
                Some(opk_id),
                b"Ecliptix_X3DH",
            )
            .unwrap();
        assert_eq!(root_key_alice, root_key_bob);

        let mut alice = Session::create(1, alice_bundle.identity_x25519, true, Config::default()).unwrap();
        let mut bob = Session::create(1, bob_bundle.identity_x25519, false, Config::default()).unwrap();

        let alice_initial_dh = alice.sender_dh_public();
        let bob_initial_dh = bob.sender_dh_public();

        alice.finalize(root_key_alice, bob_initial_dh, bob_bundle).unwrap();
        bob.finalize(root_key_bob, alice_initial_dh, alice_bundle).unwrap();

        (alice, bob)
    }

    #[test]
    fn single_message_roundtrip() {
        let (mut alice, mut bob) = linked_sessions();
        let envelope = alice.prepare_send(b"hello").unwrap();
        let plaintext = bob.process_receive(&envelope).unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn ratchet_triggers_on_tenth_message() {
        let (mut alice, mut bob) = linked_sessions();
        let mut envelopes = Vec::new();
        for i in 0..10 {
            let env = alice.prepare_send(format!("msg-{i}").as_bytes()).unwrap();
            envelopes.push(env);
        }
        for (i, env) in envelopes.iter().enumerate() {
            if i == 9 {
                assert!(env.dh_public.is_some(), "message 10 must carry a new DH public key");
            } else {
                assert!(env.dh_public.is_none(), "messages 1..9 must not carry a DH public key");
            }
        }
        for env in &envelopes {
            bob.process_receive(env).unwrap();
        }
    }

    #[test]
    fn out_of_order_delivery_within_window() {
        let (mut alice, mut bob) = linked_sessions();
        let e1 = alice.prepare_send(b"one").unwrap();
        let e2 = alice.prepare_send(b"two").unwrap();
        let e3 = alice.prepare_send(b"three").unwrap();

        assert_eq!(bob.process_receive(&e3).unwrap(), b"three");
        assert_eq!(bob.process_receive(&e1).unwrap(), b"one");
        assert_eq!(bob.process_receive(&e2).unwrap(), b"two");

        assert!(matches!(bob.process_receive(&e1), Err(EcliptixError::OutOfOrderPast)));
    }

    #[test]
    fn expired_session_rejects_send() {
        let (mut alice, _bob) = linked_sessions();
        let far_future = Instant::now() + Duration::from_secs(24 * 60 * 60 + 1);
        assert!(matches!(
            alice.prepare_send_at(b"late", far_future),
            Err(EcliptixError::SessionExpired)
        ));
    }

    #[test]
    fn not_ready_before_finalize() {
        let mut s = Session::create(1, [0u8; 32], true, Config::default()).unwrap();
        assert!(matches!(s.prepare_send(b"x"), Err(EcliptixError::NotReady)));
    }
}
