//! Fixed-size, zeroize-on-drop byte container for secret material.
//!
//! Every secret this crate ever handles (identity secrets, ephemeral
//! secrets, chain keys, message keys, root keys, DH shared secrets, OPRF
//! output, PBKDF2 output, session keys) lives only inside a `SecureBuffer`
//! or a local stack slot the caller clears on every exit path.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{EcliptixError, Result};

/// A fixed-capacity buffer that is zeroed on allocation and on drop.
pub struct SecureBuffer {
    data: Vec<u8>,
}

impl SecureBuffer {
    /// Allocate a zeroed buffer of exactly `n` bytes.
    pub fn allocate(n: usize) -> Self {
        Self { data: vec![0u8; n] }
    }

    /// Build a `SecureBuffer` that owns `bytes` directly (no copy of the
    /// caller's original allocation is retained by the caller — move the
    /// value in).
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { data: bytes }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrite the buffer's contents with `src`. Fails if `src` is larger
    /// than the buffer's capacity.
    pub fn write(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.data.len() {
            return Err(EcliptixError::InvalidInput(format!(
                "write of {} bytes exceeds buffer capacity {}",
                src.len(),
                self.data.len()
            )));
        }
        self.data[..src.len()].copy_from_slice(src);
        for b in &mut self.data[src.len()..] {
            *b = 0;
        }
        Ok(())
    }

    /// Copy this buffer's contents into `dst`. Fails if `dst` is smaller
    /// than the buffer.
    pub fn read(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < self.data.len() {
            return Err(EcliptixError::InvalidInput(format!(
                "read destination of {} bytes is smaller than buffer {}",
                dst.len(),
                self.data.len()
            )));
        }
        dst[..self.data.len()].copy_from_slice(&self.data);
        Ok(())
    }

    /// Return a fresh owned copy of the buffer's bytes. The caller becomes
    /// responsible for zeroizing or re-wrapping the copy.
    pub fn read_copy(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Constant-time comparison via `subtle`. Buffers of different length
    /// compare unequal without a length-dependent branch inside the
    /// comparison itself.
    pub fn constant_time_eq(&self, other: &SecureBuffer) -> bool {
        if self.data.len() != other.data.len() {
            return false;
        }
        self.data.ct_eq(&other.data).into()
    }

    /// Explicit early release. Equivalent to dropping the buffer, exposed
    /// for callers that want to clear a secret before its lexical scope
    /// ends.
    pub fn release(&mut self) {
        self.data.zeroize();
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Constant-time comparison of two equal-length byte slices not wrapped in
/// a `SecureBuffer` (e.g. MAC verification). Returns `false` on length
/// mismatch.
pub fn constant_time_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
