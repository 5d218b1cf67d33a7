//! ecliptix_crypto — Double Ratchet session engine and OPAQUE client.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Every fallible operation returns a typed `EcliptixError`; no panics
//!   in non-test code.
//!
//! # Module layout
//! - `identity`   — long-term Ed25519 + X25519 identity keys, prekeys, X3DH
//! - `chain_step` — one direction of the symmetric (chain) ratchet
//! - `session`    — the Double Ratchet session: root key, chain steps, AEAD framing
//! - `registry`   — concurrent `(session_id, exchange_kind) -> Session` map
//! - `protocol`   — the `ProtocolSystem` facade over identity + registry + session
//! - `opaque`     — OPAQUE aPAKE client over NIST P-256
//! - `primitives` — thin adapters over X25519/Ed25519/HKDF/AES-GCM crates
//! - `secure_buffer` — zeroize-on-drop secret buffer
//! - `config`     — tunable constants (rotation interval, cache window, TTL, ...)
//! - `error`      — unified error type

pub mod chain_step;
pub mod config;
pub mod error;
pub mod identity;
pub mod opaque;
pub mod primitives;
pub mod protocol;
pub mod registry;
pub mod secure_buffer;
pub mod session;

pub use config::Config;
pub use error::EcliptixError;
pub use protocol::ProtocolSystem;
pub use registry::{ExchangeKind, SessionRegistry};
pub use session::{Session, SessionEnvelope, SessionState};
