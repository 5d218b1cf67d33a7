use thiserror::Error;

/// Unified failure taxonomy for the session engine and the OPAQUE client.
///
/// Every fallible operation in this crate surfaces one of these variants;
/// there is no silent recovery and no control-flow-via-panic in non-test
/// code.
#[derive(Debug, Error)]
pub enum EcliptixError {
    // ── generic / shared ─────────────────────────────────────────────
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cryptographic primitive failure: {0}")]
    CryptoError(String),

    #[error("use after destroy")]
    ObjectDisposed,

    // ── handshake / X3DH ─────────────────────────────────────────────
    #[error("signed prekey signature invalid")]
    SpkSignatureInvalid,

    #[error("invalid peer key: {0}")]
    InvalidPeerKey(String),

    #[error("one-time prekey not found: {0}")]
    OpkNotFound(String),

    // ── session lifecycle ────────────────────────────────────────────
    #[error("session is not in the Complete state")]
    NotReady,

    #[error("session has expired")]
    SessionExpired,

    #[error("timed out acquiring session lock")]
    LockTimeout,

    // ── message processing ───────────────────────────────────────────
    #[error("ratchet index is in the past and not cached")]
    OutOfOrderPast,

    #[error("AEAD authentication failed")]
    AeadAuthFailed,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("DH ratchet step failed: {0}")]
    DhRatchetFailed(String),

    // ── OPAQUE ────────────────────────────────────────────────────────
    #[error("server MAC verification failed")]
    ServerMacInvalid,

    #[error("envelope could not be opened (wrong password or corrupted envelope)")]
    EnvelopeOpenFailed,

    #[error("hash-to-curve exhausted its retry budget")]
    HashToPointExhausted,

    #[error("OPRF blinding failed: {0}")]
    BlindingFailed(String),

    // ── mechanical conversions ───────────────────────────────────────
    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

pub type Result<T> = core::result::Result<T, EcliptixError>;
