//! Tunable constants for the session engine and OPAQUE client.
//!
//! Defaults match spec exactly; `ProtocolSystem` and `OpaqueClient` take a
//! `Config` by reference instead of hard-coding these so deployments can
//! tune cache window / TTL without touching the crate.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Send a DH ratchet every `dh_rotation_interval`-th message.
    pub dh_rotation_interval: u32,
    /// Bounded window of message keys retained per chain for out-of-order
    /// delivery.
    pub cache_window: u32,
    /// Sessions older than this are rejected by every operation.
    pub session_ttl: Duration,
    /// PBKDF2-HMAC-SHA-256 iteration count for OPAQUE password stretching.
    pub pbkdf2_iterations: u32,
    /// Number of one-time prekeys `IdentityKeys::generate` mints.
    pub opk_count: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dh_rotation_interval: 10,
            cache_window: 1000,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            pbkdf2_iterations: 100_000,
            opk_count: 10,
        }
    }
}
