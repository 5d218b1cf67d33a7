//! `ProtocolSystem` — the facade tying `IdentityKeys`, `SessionRegistry`,
//! and `Session` together into the four handshake/messaging operations
//! an external caller drives.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{EcliptixError, Result};
use crate::identity::{IdentityBundle, IdentityKeys};
use crate::registry::{ExchangeKind, SessionRegistry};
use crate::session::{Session, SessionEnvelope};

/// The local party's initial handshake message: its public bundle plus
/// the sender-chain DH public key the responder will ratchet against
/// first.
#[derive(Debug, Clone)]
pub struct InitMessage {
    pub bundle: IdentityBundle,
    pub initial_dh_public: [u8; 32],
}

pub struct ProtocolSystem {
    identity: RwLock<IdentityKeys>,
    registry: SessionRegistry,
    config: Config,
    next_id: AtomicU32,
}

impl ProtocolSystem {
    pub fn new(identity: IdentityKeys, config: &Config) -> Self {
        Self {
            identity: RwLock::new(identity),
            registry: SessionRegistry::new(),
            config: config.clone(),
            next_id: AtomicU32::new(1),
        }
    }

    pub async fn identity_bundle(&self) -> IdentityBundle {
        self.identity.read().await.public_bundle()
    }

    /// Initiator path: mint a session id, ensure a fresh ephemeral, build
    /// and register a `Session(is_initiator=true)`, return the init
    /// message to send to the peer.
    pub async fn begin_exchange(&self, kind: ExchangeKind) -> Result<(u32, InitMessage)> {
        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut identity = self.identity.write().await;
        identity.generate_ephemeral();
        let local_x = identity.identity_public().1;
        let bundle = identity.public_bundle();
        drop(identity);

        let session = Session::create(session_id, local_x, true, self.config.clone())?;
        let initial_dh_public = session.sender_dh_public();

        self.registry.insert(session_id, kind, session).await?;

        Ok((session_id, InitMessage { bundle, initial_dh_public }))
    }

    /// Responder path: verify the peer's SPK, run X3DH as responder,
    /// build and finalize a `Session(is_initiator=false)`, return the
    /// response message plus the derived root key. On any failure the
    /// half-open session (if it was inserted) is removed.
    pub async fn respond_to_exchange(
        &self,
        session_id: u32,
        kind: ExchangeKind,
        init_message: &InitMessage,
    ) -> Result<(InitMessage, [u8; 32])> {
        if !IdentityKeys::verify_spk(&init_message.bundle) {
            return Err(EcliptixError::SpkSignatureInvalid);
        }
        let peer_ephemeral = init_message
            .bundle
            .ephemeral_x25519
            .ok_or_else(|| EcliptixError::InvalidPeerKey("init message carries no ephemeral key".into()))?;

        let identity = self.identity.read().await;
        // Snapshot the bundle (and the OPK id it carries) before `consume_opk`
        // removes it — the initiator's `x3dh_as_initiator` reads its OPK from
        // this very bundle, so it must still list the one actually used for
        // DH4, or the two sides derive different root keys.
        let local_bundle = identity.public_bundle();
        let local_x = identity.identity_public().1;
        let opk_id = local_bundle.one_time_prekeys.first().map(|p| p.id);
        let root_key = identity.x3dh_as_responder(
            &init_message.bundle.identity_x25519,
            &peer_ephemeral,
            opk_id,
            b"Ecliptix_X3DH",
        );
        drop(identity);
        let root_key = root_key?;

        if let Some(id) = opk_id {
            self.identity.write().await.consume_opk(id);
        }

        let run = async {
            let mut session = Session::create(session_id, local_x, false, self.config.clone())?;
            let response_dh_public = session.sender_dh_public();
            session.finalize(root_key, init_message.initial_dh_public, init_message.bundle.clone())?;
            self.registry.insert(session_id, kind.clone(), session).await?;
            Ok::<_, EcliptixError>(response_dh_public)
        };

        match run.await {
            Ok(response_dh_public) => {
                Ok((InitMessage { bundle: local_bundle, initial_dh_public: response_dh_public }, root_key))
            }
            Err(e) => {
                self.registry.remove(session_id, &kind).await;
                Err(e)
            }
        }
    }

    /// Initiator finalize: run X3DH as initiator against the responder's
    /// bundle, finalize the stored session, move it to `Complete`.
    pub async fn complete_exchange(
        &self,
        session_id: u32,
        kind: ExchangeKind,
        response: &InitMessage,
    ) -> Result<[u8; 32]> {
        let identity = self.identity.read().await;
        let root_key = identity.x3dh_as_initiator(&response.bundle, b"Ecliptix_X3DH")?;
        drop(identity);

        let guard = self
            .registry
            .find(session_id, &kind)
            .await
            .ok_or_else(|| EcliptixError::InvalidInput("unknown session id".into()))?;
        let mut session = SessionRegistry::lock_session(&guard).await?;
        session.finalize(root_key, response.initial_dh_public, response.bundle.clone())?;
        Ok(root_key)
    }

    pub async fn send(&self, session_id: u32, kind: ExchangeKind, plaintext: &[u8]) -> Result<SessionEnvelope> {
        let guard = self
            .registry
            .find(session_id, &kind)
            .await
            .ok_or_else(|| EcliptixError::InvalidInput("unknown session id".into()))?;
        let mut session = SessionRegistry::lock_session(&guard).await?;
        session.prepare_send(plaintext)
    }

    pub async fn receive(&self, session_id: u32, kind: ExchangeKind, envelope: &SessionEnvelope) -> Result<Vec<u8>> {
        let guard = self
            .registry
            .find(session_id, &kind)
            .await
            .ok_or_else(|| EcliptixError::InvalidInput("unknown session id".into()))?;
        let mut session = SessionRegistry::lock_session(&guard).await?;
        session.process_receive(envelope)
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeys;

    #[tokio::test]
    async fn full_handshake_and_message_roundtrip() {
        let alice_system = ProtocolSystem::new(IdentityKeys::generate(2), &Config::default());
        let bob_system = ProtocolSystem::new(IdentityKeys::generate(2), &Config::default());
        let kind = ExchangeKind::new("direct");

        let (session_id, init) = alice_system.begin_exchange(kind.clone()).await.unwrap();
        let (response, _bob_root_key) = bob_system
            .respond_to_exchange(session_id, kind.clone(), &init)
            .await
            .unwrap();
        let _alice_root_key = alice_system
            .complete_exchange(session_id, kind.clone(), &response)
            .await
            .unwrap();

        let envelope = alice_system.send(session_id, kind.clone(), b"hello bob").await.unwrap();
        let plaintext = bob_system.receive(session_id, kind, &envelope).await.unwrap();
        assert_eq!(plaintext, b"hello bob");
    }

    #[tokio::test]
    async fn responder_removes_half_open_session_on_bad_spk() {
        let alice_system = ProtocolSystem::new(IdentityKeys::generate(1), &Config::default());
        let bob_system = ProtocolSystem::new(IdentityKeys::generate(1), &Config::default());
        let kind = ExchangeKind::new("direct");

        let (session_id, mut init) = alice_system.begin_exchange(kind.clone()).await.unwrap();
        init.bundle.spk_signature[0] ^= 0x01;

        let result = bob_system.respond_to_exchange(session_id, kind.clone(), &init).await;
        assert!(matches!(result, Err(EcliptixError::SpkSignatureInvalid)));
        assert_eq!(bob_system.registry.len().await, 0);
    }
}
