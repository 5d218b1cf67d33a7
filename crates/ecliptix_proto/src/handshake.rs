//! Wire projection of a handshake message: one party's public bundle
//! plus the sender-chain DH public key the peer ratchets against first,
//! tagged with the exchange kind and the session's current state.

use serde::{Deserialize, Serialize};

use ecliptix_crypto::protocol::InitMessage;
use ecliptix_crypto::{ExchangeKind, SessionState};

use crate::bundle::PublicBundle;

/// Wire twin of `ecliptix_crypto::session::SessionState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    Init,
    Pending,
    Complete,
}

impl From<SessionState> for HandshakeState {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Init => HandshakeState::Init,
            SessionState::Pending => HandshakeState::Pending,
            SessionState::Complete => HandshakeState::Complete,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub session_id: u32,
    /// Caller-defined tag distinguishing concurrent exchanges over the
    /// same identity (see `ecliptix_crypto::ExchangeKind`).
    pub kind: String,
    pub state: HandshakeState,
    pub bundle: PublicBundle,
    #[serde(with = "crate::codec::base64_array32")]
    pub initial_dh_public: [u8; 32],
}

impl HandshakeMessage {
    pub fn new(session_id: u32, kind: &ExchangeKind, state: HandshakeState, init: &InitMessage) -> Self {
        Self {
            session_id,
            kind: kind.0.clone(),
            state,
            bundle: PublicBundle::from(&init.bundle),
            initial_dh_public: init.initial_dh_public,
        }
    }

    pub fn exchange_kind(&self) -> ExchangeKind {
        ExchangeKind::new(self.kind.clone())
    }

    pub fn to_init_message(&self) -> InitMessage {
        InitMessage {
            bundle: (&self.bundle).into(),
            initial_dh_public: self.initial_dh_public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecliptix_crypto::identity::IdentityKeys;

    #[test]
    fn handshake_message_round_trips_through_json() {
        let mut identity = IdentityKeys::generate(1);
        identity.generate_ephemeral();
        let init = InitMessage { bundle: identity.public_bundle(), initial_dh_public: [5u8; 32] };
        let kind = ExchangeKind::new("direct");

        let wire = HandshakeMessage::new(7, &kind, HandshakeState::Init, &init);
        let json = serde_json::to_string(&wire).unwrap();
        let back: HandshakeMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(back.session_id, 7);
        assert_eq!(back.exchange_kind(), kind);
        assert_eq!(back.initial_dh_public, init.initial_dh_public);
    }
}
