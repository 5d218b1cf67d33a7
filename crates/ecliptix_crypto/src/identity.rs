//! Long-term identity keys, prekey bundles, and the X3DH handshake roles.
//!
//! Each party owns one long-term Ed25519 identity keypair (signing), one
//! long-term X25519 identity keypair (DH), a signed prekey rotated
//! periodically, a bag of one-time prekeys consumed once per session
//! init, and an optional ephemeral keypair for the handshake currently in
//! flight. `IdentityKeys` is the only owner of this secret material; its
//! public projection is `IdentityBundle`.

use std::collections::HashMap;

use crate::error::{EcliptixError, Result};
use crate::primitives::{self, ed25519_sign, ed25519_verify, x25519_base, x25519_dh};
use crate::secure_buffer::SecureBuffer;

const X3DH_DOMAIN_PAD: [u8; 32] = [0xFF; 32];
const X3DH_SALT: [u8; 32] = [0x00; 32];

/// One one-time prekey as published in an `IdentityBundle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimePrekeyPublic {
    pub id: u32,
    pub public: [u8; 32],
}

/// Public projection of `IdentityKeys`. A pure function of the private
/// state — never the other way around.
#[derive(Debug, Clone)]
pub struct IdentityBundle {
    pub identity_ed25519: [u8; 32],
    pub identity_x25519: [u8; 32],
    pub signed_prekey_id: u32,
    pub signed_prekey_public: [u8; 32],
    pub spk_signature: [u8; 64],
    pub ephemeral_x25519: Option<[u8; 32]>,
    pub one_time_prekeys: Vec<OneTimePrekeyPublic>,
}

impl IdentityBundle {
    /// Signal-style safety-number fingerprint over the Ed25519 identity
    /// key: BLAKE3, truncated to 160 bits, hex in groups of 4.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.identity_ed25519);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Numeric fingerprint: 12 groups of 5 digits (60 digits total),
    /// matching Signal's safety number layout.
    pub fn numeric_fingerprint(&self) -> String {
        let hash = blake3::hash(&self.identity_ed25519);
        let bytes = hash.as_bytes();
        let mut groups = Vec::with_capacity(12);
        for i in 0..12 {
            let offset = i * 5 / 2;
            let val = if i % 2 == 0 {
                ((bytes[offset] as u32) << 12)
                    | ((bytes[offset + 1] as u32) << 4)
                    | ((bytes[offset + 2] as u32) >> 4)
            } else {
                (((bytes[offset] & 0x0F) as u32) << 16)
                    | ((bytes[offset + 1] as u32) << 8)
                    | (bytes[offset + 2] as u32)
            };
            groups.push(format!("{:05}", val % 100_000));
        }
        groups.join(" ")
    }
}

struct SignedPrekey {
    id: u32,
    secret: SecureBuffer,
    public: [u8; 32],
    signature: [u8; 64],
}

struct OneTimePrekey {
    secret: SecureBuffer,
    public: [u8; 32],
}

/// Owner of all long-term secret material for one party. Secrets exist
/// only inside `SecureBuffer`s; dropping an `IdentityKeys` zeroes
/// everything it holds.
pub struct IdentityKeys {
    ed25519_secret: SecureBuffer,
    ed25519_public: [u8; 32],
    x25519_identity_secret: SecureBuffer,
    x25519_identity_public: [u8; 32],
    spk: SignedPrekey,
    opks: HashMap<u32, OneTimePrekey>,
    ephemeral: Option<(SecureBuffer, [u8; 32])>,
}

impl IdentityKeys {
    /// Generate a fresh identity: Ed25519 + X25519 identity keypairs, a
    /// random-id signed prekey with its Ed25519 signature, and
    /// `opk_count` one-time prekeys with unique ids.
    pub fn generate(opk_count: u32) -> Self {
        let (ed_sk, ed_pk) = primitives::ed25519_keypair();
        let (x_sk, x_pk) = primitives::x25519_keypair();

        let (spk_sk, spk_pk) = primitives::x25519_keypair();
        let spk_id = primitives::random_u32();
        let spk_sig = ed25519_sign(&ed_sk, &spk_pk);

        let mut opks = HashMap::new();
        while opks.len() < opk_count as usize {
            let id = primitives::random_u32();
            if opks.contains_key(&id) {
                continue;
            }
            let (sk, pk) = primitives::x25519_keypair();
            opks.insert(id, OneTimePrekey { secret: SecureBuffer::from_vec(sk.to_vec()), public: pk });
        }

        Self {
            ed25519_secret: SecureBuffer::from_vec(ed_sk.to_vec()),
            ed25519_public: ed_pk,
            x25519_identity_secret: SecureBuffer::from_vec(x_sk.to_vec()),
            x25519_identity_public: x_pk,
            spk: SignedPrekey {
                id: spk_id,
                secret: SecureBuffer::from_vec(spk_sk.to_vec()),
                public: spk_pk,
                signature: spk_sig,
            },
            opks,
            ephemeral: None,
        }
    }

    /// Replace any prior ephemeral keypair; the old one is destroyed by
    /// drop (`SecureBuffer` zeroes on drop).
    pub fn generate_ephemeral(&mut self) {
        let (sk, pk) = primitives::x25519_keypair();
        self.ephemeral = Some((SecureBuffer::from_vec(sk.to_vec()), pk));
    }

    pub fn identity_public(&self) -> ([u8; 32], [u8; 32]) {
        (self.ed25519_public, self.x25519_identity_public)
    }

    pub fn public_bundle(&self) -> IdentityBundle {
        IdentityBundle {
            identity_ed25519: self.ed25519_public,
            identity_x25519: self.x25519_identity_public,
            signed_prekey_id: self.spk.id,
            signed_prekey_public: self.spk.public,
            spk_signature: self.spk.signature,
            ephemeral_x25519: self.ephemeral.as_ref().map(|(_, pk)| *pk),
            one_time_prekeys: self
                .opks
                .iter()
                .map(|(id, opk)| OneTimePrekeyPublic { id: *id, public: opk.public })
                .collect(),
        }
    }

    /// Verify the SPK signature embedded in a peer's bundle. Array-typed
    /// fields are already length-checked by the type system; this also
    /// guards against an empty OPK-absent ephemeral mismatch by relying
    /// solely on the Ed25519 verification of the SPK public key.
    pub fn verify_spk(bundle: &IdentityBundle) -> bool {
        ed25519_verify(
            &bundle.identity_ed25519,
            &bundle.signed_prekey_public,
            &bundle.spk_signature,
        )
    }

    fn spk_secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.spk.secret.read(&mut out).expect("SPK secret is always 32 bytes");
        out
    }

    fn identity_x25519_secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.x25519_identity_secret
            .read(&mut out)
            .expect("identity X25519 secret is always 32 bytes");
        out
    }

    fn ephemeral_secret_bytes(&self) -> Result<[u8; 32]> {
        let (buf, _) = self
            .ephemeral
            .as_ref()
            .ok_or_else(|| EcliptixError::InvalidInput("no ephemeral keypair generated".into()))?;
        let mut out = [0u8; 32];
        buf.read(&mut out).expect("ephemeral secret is always 32 bytes");
        Ok(out)
    }

    /// X3DH as the initiator (Alice). Requires a current ephemeral
    /// keypair (call `generate_ephemeral` first).
    ///
    /// `DH1 = DH(EKa, IKb)`, `DH2 = DH(EKa, SPKb)`, `DH3 = DH(IKa, SPKb)`,
    /// `DH4 = DH(EKa, OPKb)` when the peer bundle carries an OPK.
    pub fn x3dh_as_initiator(&self, peer_bundle: &IdentityBundle, info: &[u8]) -> Result<[u8; 32]> {
        if !Self::verify_spk(peer_bundle) {
            return Err(EcliptixError::SpkSignatureInvalid);
        }
        let ek_a = self.ephemeral_secret_bytes()?;
        let ik_a = self.identity_x25519_secret_bytes();

        let ik_b = peer_bundle.identity_x25519;
        let spk_b = peer_bundle.signed_prekey_public;

        let dh1 = x25519_dh(&ek_a, &ik_b);
        let dh2 = x25519_dh(&ek_a, &spk_b);
        let dh3 = x25519_dh(&ik_a, &spk_b);

        let mut ikm = Vec::with_capacity(32 * 5);
        ikm.extend_from_slice(&X3DH_DOMAIN_PAD);
        ikm.extend_from_slice(&dh1);
        ikm.extend_from_slice(&dh2);
        ikm.extend_from_slice(&dh3);

        if let Some(opk_pub) = peer_bundle.one_time_prekeys.first() {
            let dh4 = x25519_dh(&ek_a, &opk_pub.public);
            ikm.extend_from_slice(&dh4);
        }

        let root_key = primitives::hkdf_extract_then_expand(Some(&X3DH_SALT), &ikm, info, 32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&root_key);
        Ok(out)
    }

    /// X3DH as the responder (Bob). `peer_identity_x` / `peer_ephemeral_x`
    /// are Alice's X25519 identity and ephemeral public keys; `opk_id`, if
    /// present, names the OPK Alice claims to have consumed.
    ///
    /// Mirrors Alice's DH set via commutativity: `DH(EKa, IKb) ==
    /// DH(IKb_secret, EKa_pub)`, and so on for DH2/DH3/DH4.
    pub fn x3dh_as_responder(
        &self,
        peer_identity_x: &[u8; 32],
        peer_ephemeral_x: &[u8; 32],
        opk_id: Option<u32>,
        info: &[u8],
    ) -> Result<[u8; 32]> {
        let ik_b = self.identity_x25519_secret_bytes();
        let spk_b = self.spk_secret_bytes();

        let dh1 = x25519_dh(&ik_b, peer_ephemeral_x);
        let dh2 = x25519_dh(&spk_b, peer_ephemeral_x);
        let dh3 = x25519_dh(&spk_b, peer_identity_x);

        let mut ikm = Vec::with_capacity(32 * 5);
        ikm.extend_from_slice(&X3DH_DOMAIN_PAD);
        ikm.extend_from_slice(&dh1);
        ikm.extend_from_slice(&dh2);
        ikm.extend_from_slice(&dh3);

        if let Some(id) = opk_id {
            let opk = self
                .opks
                .get(&id)
                .ok_or_else(|| EcliptixError::OpkNotFound(id.to_string()))?;
            let mut opk_secret = [0u8; 32];
            opk.secret.read(&mut opk_secret).expect("OPK secret is always 32 bytes");
            let dh4 = x25519_dh(&opk_secret, peer_ephemeral_x);
            ikm.extend_from_slice(&dh4);
        }

        let root_key = primitives::hkdf_extract_then_expand(Some(&X3DH_SALT), &ikm, info, 32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&root_key);
        Ok(out)
    }

    /// Consume (remove) the named one-time prekey once the responder
    /// path has used it. Idempotent if already removed.
    pub fn consume_opk(&mut self, id: u32) {
        self.opks.remove(&id);
    }

    /// Identity X25519 static public key, used as AD alongside the
    /// peer's in session message encryption.
    pub fn x25519_identity_public(&self) -> [u8; 32] {
        self.x25519_identity_public
    }
}

/// Derive an X25519 public key from a secret via the base point. Used by
/// the session layer for DH ratchet keypairs, not for identity keys.
pub fn public_from_secret(sk: &[u8; 32]) -> [u8; 32] {
    x25519_base(sk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x3dh_symmetry_without_opk() {
        let mut alice = IdentityKeys::generate(0);
        let bob = IdentityKeys::generate(0);
        alice.generate_ephemeral();

        let bob_bundle = bob.public_bundle();
        let alice_bundle = alice.public_bundle();

        let rk_alice = alice.x3dh_as_initiator(&bob_bundle, b"Ecliptix_X3DH").unwrap();
        let rk_bob = bob
            .x3dh_as_responder(
                &alice_bundle.identity_x25519,
                &alice_bundle.ephemeral_x25519.unwrap(),
                None,
                b"Ecliptix_X3DH",
            )
            .unwrap();
        assert_eq!(rk_alice, rk_bob);
    }

    #[test]
    fn x3dh_symmetry_with_opk() {
        let mut alice = IdentityKeys::generate(0);
        let bob = IdentityKeys::generate(3);
        alice.generate_ephemeral();

        let bob_bundle = bob.public_bundle();
        let opk_id = bob_bundle.one_time_prekeys[0].id;
        let alice_bundle = alice.public_bundle();

        let rk_alice = alice.x3dh_as_initiator(&bob_bundle, b"Ecliptix_X3DH").unwrap();
        let rk_bob = bob
            .x3dh_as_responder(
                &alice_bundle.identity_x25519,
                &alice_bundle.ephemeral_x25519.unwrap(),
                Some(opk_id),
                b"Ecliptix_X3DH",
            )
            .unwrap();
        assert_eq!(rk_alice, rk_bob);
    }

    #[test]
    fn verify_spk_detects_tampering() {
        let bob = IdentityKeys::generate(0);
        let mut bundle = bob.public_bundle();
        assert!(IdentityKeys::verify_spk(&bundle));
        bundle.signed_prekey_public[0] ^= 0x01;
        assert!(!IdentityKeys::verify_spk(&bundle));
    }

    #[test]
    fn x3dh_rejects_bad_spk_signature() {
        let mut alice = IdentityKeys::generate(0);
        let bob = IdentityKeys::generate(0);
        alice.generate_ephemeral();
        let mut bob_bundle = bob.public_bundle();
        bob_bundle.spk_signature[0] ^= 0x01;
        assert!(matches!(
            alice.x3dh_as_initiator(&bob_bundle, b"Ecliptix_X3DH"),
            Err(EcliptixError::SpkSignatureInvalid)
        ));
    }
}
