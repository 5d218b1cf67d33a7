//! One direction of the symmetric (chain) ratchet.
//!
//! A `ChainStep` holds a chain key, an optional DH keypair, a current
//! index, and a bounded cache of not-yet-consumed message keys. Two
//! `ChainStep`s (one per direction) plus a root key make up a `Session`.

use std::collections::BTreeMap;

use crate::error::{EcliptixError, Result};
use crate::primitives;
use crate::secure_buffer::SecureBuffer;

const MSG_INFO: &[u8] = b"Msg";
const CHAIN_INFO: &[u8] = b"Chain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Sender,
    Receiver,
}

/// A single derived message key, bound to its chain-epoch index.
pub struct MessageKey {
    pub index: u32,
    key: SecureBuffer,
}

impl MessageKey {
    pub fn bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.key.read(&mut out).expect("message key is always 32 bytes");
        out
    }
}

pub struct ChainStep {
    kind: ChainKind,
    chain_key: SecureBuffer,
    dh_secret: Option<SecureBuffer>,
    dh_public: Option<[u8; 32]>,
    current_index: u32,
    cache_window: u32,
    is_new_chain: bool,
    cache: BTreeMap<u32, MessageKey>,
}

impl ChainStep {
    pub fn create(
        kind: ChainKind,
        initial_chain_key: [u8; 32],
        dh_sk: Option<[u8; 32]>,
        dh_pk: Option<[u8; 32]>,
        cache_window: Option<u32>,
    ) -> Result<Self> {
        if dh_sk.is_some() != dh_pk.is_some() {
            return Err(EcliptixError::InvalidInput(
                "dh_sk and dh_pk must both be present or both absent".into(),
            ));
        }
        Ok(Self {
            kind,
            chain_key: SecureBuffer::from_vec(initial_chain_key.to_vec()),
            dh_secret: dh_sk.map(|sk| SecureBuffer::from_vec(sk.to_vec())),
            dh_public: dh_pk,
            current_index: 0,
            cache_window: cache_window.unwrap_or(1000),
            is_new_chain: false,
            cache: BTreeMap::new(),
        })
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    pub fn dh_public(&self) -> Option<[u8; 32]> {
        self.dh_public
    }

    pub fn dh_secret_bytes(&self) -> Option<[u8; 32]> {
        self.dh_secret.as_ref().map(|buf| {
            let mut out = [0u8; 32];
            buf.read(&mut out).expect("DH secret is always 32 bytes");
            out
        })
    }

    pub fn is_new_chain(&self) -> bool {
        self.is_new_chain
    }

    fn chain_key_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.chain_key.read(&mut out).expect("chain key is always 32 bytes");
        out
    }

    /// One chain-ratchet step: `(message_key_i, next_chain_key)` derived
    /// from the current chain key, both via HKDF-expand with an empty
    /// salt and the current chain key as PRK.
    fn step(&self) -> Result<([u8; 32], [u8; 32])> {
        let ck = self.chain_key_bytes();
        let mk = primitives::hkdf_expand(&ck, MSG_INFO, 32)?;
        let next_ck = primitives::hkdf_expand(&ck, CHAIN_INFO, 32)?;
        let mut mk_arr = [0u8; 32];
        mk_arr.copy_from_slice(&mk);
        let mut next_arr = [0u8; 32];
        next_arr.copy_from_slice(&next_ck);
        Ok((mk_arr, next_arr))
    }

    /// Derive the message key for `target_index`, skipping forward and
    /// caching intermediate keys as needed.
    pub fn derive_key(&mut self, target_index: u32) -> Result<[u8; 32]> {
        if let Some(mk) = self.cache.get(&target_index) {
            return Ok(mk.bytes());
        }
        if target_index <= self.current_index {
            return Err(EcliptixError::OutOfOrderPast);
        }

        let mut next_index = self.current_index;
        while next_index < target_index {
            let (mk, next_ck) = self.step()?;
            next_index += 1;
            self.cache.insert(
                next_index,
                MessageKey { index: next_index, key: SecureBuffer::from_vec(mk.to_vec()) },
            );
            self.chain_key.write(&next_ck)?;
        }
        self.current_index = target_index;
        self.prune(self.cache_window);

        let mk = self
            .cache
            .get(&target_index)
            .expect("just-derived key is present in the cache");
        Ok(mk.bytes())
    }

    /// Replace the chain key (and, for the new epoch, the DH keypair)
    /// after a DH ratchet step. Resets the index to 0; sender chains are
    /// marked as a new chain so the session knows to carry a fresh
    /// `dh_public` on the next outbound envelope.
    pub fn update_after_dh_ratchet(
        &mut self,
        new_chain_key: [u8; 32],
        new_dh_sk: Option<[u8; 32]>,
        new_dh_pk: Option<[u8; 32]>,
    ) -> Result<()> {
        if new_dh_sk.is_some() != new_dh_pk.is_some() {
            return Err(EcliptixError::InvalidInput(
                "new_dh_sk and new_dh_pk must both be present or both absent".into(),
            ));
        }
        self.chain_key = SecureBuffer::from_vec(new_chain_key.to_vec());
        if let Some(sk) = new_dh_sk {
            self.dh_secret = Some(SecureBuffer::from_vec(sk.to_vec()));
        }
        if let Some(pk) = new_dh_pk {
            self.dh_public = Some(pk);
        }
        self.current_index = 0;
        self.cache.clear();
        if self.kind == ChainKind::Sender {
            self.is_new_chain = true;
        }
        Ok(())
    }

    pub fn clear_new_chain_flag(&mut self) {
        self.is_new_chain = false;
    }

    /// Drop every cached key with `index < current_index - window + 1`.
    pub fn prune(&mut self, window: u32) {
        let floor = self.current_index.saturating_sub(window.saturating_sub(1));
        self.cache.retain(|&idx, _| idx >= floor);
    }

    /// Clear every cached message key (used when a DH ratchet supersedes
    /// the current epoch).
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_derivation_matches_independent_derivation() {
        let ck = [5u8; 32];
        let mut a = ChainStep::create(ChainKind::Sender, ck, None, None, None).unwrap();
        let mut b = ChainStep::create(ChainKind::Sender, ck, None, None, None).unwrap();

        let k1 = a.derive_key(1).unwrap();
        let k2 = a.derive_key(2).unwrap();

        // b derives directly to 2, skipping 1 — must still cache key 1.
        let k2_direct = b.derive_key(2).unwrap();
        assert_eq!(k2, k2_direct);
        let k1_cached = b.derive_key(1).unwrap();
        assert_eq!(k1, k1_cached);
    }

    #[test]
    fn past_uncached_index_fails() {
        let mut step = ChainStep::create(ChainKind::Receiver, [1u8; 32], None, None, None).unwrap();
        step.derive_key(5).unwrap();
        assert!(matches!(step.derive_key(3), Err(EcliptixError::OutOfOrderPast)));
    }

    #[test]
    fn prune_respects_window() {
        let mut step =
            ChainStep::create(ChainKind::Receiver, [2u8; 32], None, None, Some(3)).unwrap();
        for i in 1..=10u32 {
            step.derive_key(i).unwrap();
        }
        // window 3 means only indices >= 10 - 3 + 1 = 8 survive
        assert!(step.cache.contains_key(&8));
        assert!(!step.cache.contains_key(&7));
    }

    #[test]
    fn mismatched_dh_presence_rejected() {
        let result = ChainStep::create(ChainKind::Sender, [0u8; 32], Some([1u8; 32]), None, None);
        assert!(result.is_err());
    }
}
