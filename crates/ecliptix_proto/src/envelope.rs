//! Encrypted message envelope — what a relay or transport layer sees on
//! the wire. Fields mirror `ecliptix_crypto::session::SessionEnvelope`
//! plus a `request_id` the transport uses for ack/dedup; nothing here
//! carries plaintext, a message type, or any chain-key material.

use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use ecliptix_crypto::session::SessionEnvelope;

/// On-wire Double Ratchet envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Caller-assigned id for ack/dedup; no cryptographic meaning.
    pub request_id: u32,

    /// 8 random bytes || 4-byte little-endian counter, base64-encoded.
    #[serde(with = "crate::codec::base64_array12")]
    pub nonce: [u8; 12],

    /// Position in the receiving chain the recipient must derive to open
    /// this envelope.
    pub ratchet_index: u32,

    /// AES-256-GCM ciphertext with the 16-byte tag appended, base64-encoded.
    #[serde(with = "crate::codec::base64_vec")]
    pub cipher: Vec<u8>,

    /// Milliseconds since the Unix epoch, set by the sender.
    pub created_at: i64,

    /// Present only when this envelope carries a new sender DH ratchet
    /// public key, base64-encoded.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[serde(with = "crate::codec::base64_opt_array32")]
    pub dh_public: Option<[u8; 32]>,
}

impl Envelope {
    pub fn from_session_envelope(request_id: u32, envelope: &SessionEnvelope) -> Self {
        let created_at = envelope
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            request_id,
            nonce: envelope.nonce,
            ratchet_index: envelope.ratchet_index,
            cipher: envelope.cipher.clone(),
            created_at,
            dh_public: envelope.dh_public,
        }
    }

    pub fn to_session_envelope(&self) -> SessionEnvelope {
        SessionEnvelope {
            ratchet_index: self.ratchet_index,
            nonce: self.nonce,
            cipher: self.cipher.clone(),
            dh_public: self.dh_public,
            created_at: UNIX_EPOCH + std::time::Duration::from_millis(self.created_at.max(0) as u64),
        }
    }
}

/// Server-side metadata stapled on when an envelope is queued for a
/// recipient that is currently offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEnvelope {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub received_at: i64,
    pub delivered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn sample() -> SessionEnvelope {
        SessionEnvelope {
            ratchet_index: 7,
            nonce: [1u8; 12],
            cipher: vec![9u8; 40],
            dh_public: Some([2u8; 32]),
            created_at: SystemTime::now(),
        }
    }

    #[test]
    fn json_roundtrip_preserves_fields() {
        let original = sample();
        let wire = Envelope::from_session_envelope(1, &original);
        let json = serde_json::to_string(&wire).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ratchet_index, original.ratchet_index);
        assert_eq!(back.nonce, original.nonce);
        assert_eq!(back.cipher, original.cipher);
        assert_eq!(back.dh_public, original.dh_public);
    }

    #[test]
    fn without_dh_public_round_trips_as_none() {
        let mut original = sample();
        original.dh_public = None;
        let wire = Envelope::from_session_envelope(2, &original);
        let json = serde_json::to_string(&wire).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert!(back.dh_public.is_none());
    }
}
