//! Thin adapters over audited primitive crates.
//!
//! No custom crypto: X25519 and Ed25519 come from `x25519-dalek` /
//! `ed25519-dalek`, HKDF-SHA-256 from `hkdf`, AES-256-GCM from `aes-gcm`,
//! and randomness from the OS CSPRNG via `rand`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::{EcliptixError, Result};

pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;

/// Generate a fresh X25519 keypair. `x25519-dalek` applies RFC 7748
/// clamping internally.
pub fn x25519_keypair() -> ([u8; 32], [u8; 32]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519Public::from(&secret);
    (secret.to_bytes(), *public.as_bytes())
}

/// `pk = x25519_base(sk)`.
pub fn x25519_base(sk: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*sk);
    *X25519Public::from(&secret).as_bytes()
}

/// `DH(sk, pk) -> 32B` shared secret.
pub fn x25519_dh(sk: &[u8; 32], pk: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*sk);
    let public = X25519Public::from(*pk);
    *secret.diffie_hellman(&public).as_bytes()
}

/// Generate a fresh Ed25519 keypair. Returns `(secret, public)`.
pub fn ed25519_keypair() -> ([u8; 32], [u8; 32]) {
    let signing_key = SigningKey::generate(&mut OsRng);
    (signing_key.to_bytes(), signing_key.verifying_key().to_bytes())
}

/// Sign `msg` with a 32-byte Ed25519 secret. Returns a 64-byte signature.
pub fn ed25519_sign(sk: &[u8; 32], msg: &[u8]) -> [u8; 64] {
    SigningKey::from_bytes(sk).sign(msg).to_bytes()
}

/// Verify a 64-byte Ed25519 signature under a 32-byte public key.
pub fn ed25519_verify(pk: &[u8; 32], msg: &[u8], sig: &[u8; 64]) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(pk) else {
        return false;
    };
    let sig = Signature::from_bytes(sig);
    vk.verify(msg, &sig).is_ok()
}

/// HKDF-Extract with SHA-256.
pub fn hkdf_extract(salt: Option<&[u8]>, ikm: &[u8]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(salt, ikm);
    prk.into()
}

/// HKDF-Expand with SHA-256 from an already-extracted PRK.
pub fn hkdf_expand(prk: &[u8; 32], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::from_prk(prk)
        .map_err(|e| EcliptixError::CryptoError(format!("invalid HKDF PRK: {e}")))?;
    let mut out = vec![0u8; len];
    hk.expand(info, &mut out)
        .map_err(|e| EcliptixError::CryptoError(format!("HKDF expand failed: {e}")))?;
    Ok(out)
}

/// Convenience: `hkdf_expand(hkdf_extract(salt, ikm), info, len)`.
pub fn hkdf_extract_then_expand(
    salt: Option<&[u8]>,
    ikm: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>> {
    let prk = hkdf_extract(salt, ikm);
    hkdf_expand(&prk, info, len)
}

/// AES-256-GCM seal. Returns `(ciphertext, tag)` with a 16-byte tag.
pub fn aead_seal(
    key: &[u8; 32],
    nonce: &[u8; AEAD_NONCE_LEN],
    ad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN])> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce);
    let mut out = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: ad })
        .map_err(|_| EcliptixError::CryptoError("AEAD seal failed".into()))?;
    let tag_start = out.len() - AEAD_TAG_LEN;
    let tag_bytes = out.split_off(tag_start);
    let mut tag = [0u8; AEAD_TAG_LEN];
    tag.copy_from_slice(&tag_bytes);
    Ok((out, tag))
}

/// AES-256-GCM open. `ciphertext` excludes the tag; `tag` is the trailing
/// 16 bytes.
pub fn aead_open(
    key: &[u8; 32],
    nonce: &[u8; AEAD_NONCE_LEN],
    ad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; AEAD_TAG_LEN],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce);
    let mut combined = Vec::with_capacity(ciphertext.len() + AEAD_TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    cipher
        .decrypt(nonce, Payload { msg: &combined, aad: ad })
        .map_err(|_| EcliptixError::AeadAuthFailed)
}

/// `len` bytes from the OS CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    OsRng.fill_bytes(&mut out);
    out
}

pub fn random_u32() -> u32 {
    OsRng.next_u32()
}

/// SHA-256 digest.
pub fn sha256(msg: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// HMAC-SHA-256.
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}
