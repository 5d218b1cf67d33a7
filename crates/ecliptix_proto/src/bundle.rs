//! Wire projection of a published identity bundle: long-term identity
//! keys, the current signed prekey, and the one-time prekey bag. This is
//! what one party fetches about another before starting a handshake.

use serde::{Deserialize, Serialize};

use ecliptix_crypto::identity::{IdentityBundle, OneTimePrekeyPublic};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePrekeyWire {
    pub id: u32,
    #[serde(with = "crate::codec::base64_array32")]
    pub public: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicBundle {
    #[serde(with = "crate::codec::base64_array32")]
    pub identity_ed25519: [u8; 32],
    #[serde(with = "crate::codec::base64_array32")]
    pub identity_x25519: [u8; 32],
    pub signed_prekey_id: u32,
    #[serde(with = "crate::codec::base64_array32")]
    pub signed_prekey_public: [u8; 32],
    #[serde(with = "crate::codec::base64_array64")]
    pub signed_prekey_signature: [u8; 64],
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[serde(with = "crate::codec::base64_opt_array32")]
    pub ephemeral_x25519: Option<[u8; 32]>,
    pub one_time_prekeys: Vec<OneTimePrekeyWire>,
}

impl From<&IdentityBundle> for PublicBundle {
    fn from(bundle: &IdentityBundle) -> Self {
        Self {
            identity_ed25519: bundle.identity_ed25519,
            identity_x25519: bundle.identity_x25519,
            signed_prekey_id: bundle.signed_prekey_id,
            signed_prekey_public: bundle.signed_prekey_public,
            signed_prekey_signature: bundle.spk_signature,
            ephemeral_x25519: bundle.ephemeral_x25519,
            one_time_prekeys: bundle
                .one_time_prekeys
                .iter()
                .map(|p| OneTimePrekeyWire { id: p.id, public: p.public })
                .collect(),
        }
    }
}

impl From<&PublicBundle> for IdentityBundle {
    fn from(wire: &PublicBundle) -> Self {
        Self {
            identity_ed25519: wire.identity_ed25519,
            identity_x25519: wire.identity_x25519,
            signed_prekey_id: wire.signed_prekey_id,
            signed_prekey_public: wire.signed_prekey_public,
            spk_signature: wire.signed_prekey_signature,
            ephemeral_x25519: wire.ephemeral_x25519,
            one_time_prekeys: wire
                .one_time_prekeys
                .iter()
                .map(|p| OneTimePrekeyPublic { id: p.id, public: p.public })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecliptix_crypto::identity::IdentityKeys;

    #[test]
    fn bundle_round_trips_through_json() {
        let identity = IdentityKeys::generate(2);
        let bundle = identity.public_bundle();
        let wire = PublicBundle::from(&bundle);

        let json = serde_json::to_string(&wire).unwrap();
        let back: PublicBundle = serde_json::from_str(&json).unwrap();

        assert_eq!(back.identity_ed25519, bundle.identity_ed25519);
        assert_eq!(back.one_time_prekeys.len(), bundle.one_time_prekeys.len());

        let restored = IdentityBundle::from(&back);
        assert!(IdentityKeys::verify_spk(&restored));
    }
}
