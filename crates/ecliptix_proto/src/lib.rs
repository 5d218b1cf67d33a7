//! ecliptix_proto — wire types for the secure channel: Double Ratchet
//! envelopes, identity bundles, handshake messages, and OPAQUE
//! registration/login framing. All types serialise to JSON with
//! fixed-length byte fields base64-encoded.
//!
//! # Modules
//! - `envelope`    — the on-wire Double Ratchet message envelope
//! - `bundle`      — the published identity bundle (identity keys, SPK, OPKs)
//! - `handshake`   — the X3DH handshake message plus session state
//! - `opaque_wire` — OPAQUE registration/login message framing
//! - `codec`       — shared base64 <-> fixed-array serde adapters

pub mod bundle;
pub mod codec;
pub mod envelope;
pub mod handshake;
pub mod opaque_wire;

pub use bundle::{OneTimePrekeyWire, PublicBundle};
pub use envelope::{Envelope, StoredEnvelope};
pub use handshake::{HandshakeMessage, HandshakeState};
pub use opaque_wire::{
    Ke1Message, Ke2Message, Ke3Message, RegistrationRecord, RegistrationRequest, RegistrationResponse,
};
