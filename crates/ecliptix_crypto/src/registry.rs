//! Shared map from `(session_id, exchange_kind)` to a mutex-guarded
//! session. The registry lock is held only for map operations; no
//! cryptographic work happens while it is held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::error::{EcliptixError, Result};
use crate::session::Session;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller-defined tag distinguishing concurrent exchange purposes over
/// the same identity (e.g. a primary chat channel vs. a linked-device
/// channel). Opaque to the registry beyond equality/hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeKind(pub String);

impl ExchangeKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

type RegistryKey = (u32, ExchangeKind);

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<RegistryKey, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    /// Insert a freshly created session. Fails if `(id, kind)` is already
    /// occupied.
    pub async fn insert(&self, id: u32, kind: ExchangeKind, session: Session) -> Result<()> {
        let mut map = self.sessions.write().await;
        let key = (id, kind);
        if map.contains_key(&key) {
            return Err(EcliptixError::InvalidInput(format!(
                "session {} already registered for this exchange kind",
                key.0
            )));
        }
        map.insert(key, Arc::new(Mutex::new(session)));
        Ok(())
    }

    /// Return the shared, mutex-guarded session for `(id, kind)`.
    pub async fn find(&self, id: u32, kind: &ExchangeKind) -> Option<Arc<Mutex<Session>>> {
        let map = self.sessions.read().await;
        map.get(&(id, kind.clone())).cloned()
    }

    /// Idempotent remove. The session (and every secret it holds) is
    /// dropped once the last `Arc` reference is released.
    pub async fn remove(&self, id: u32, kind: &ExchangeKind) {
        let mut map = self.sessions.write().await;
        map.remove(&(id, kind.clone()));
    }

    /// Acquire a session's mutex with the standard 5-second timeout.
    pub async fn lock_session(
        guard: &Arc<Mutex<Session>>,
    ) -> Result<tokio::sync::MutexGuard<'_, Session>> {
        tokio::time::timeout(LOCK_TIMEOUT, guard.lock())
            .await
            .map_err(|_| EcliptixError::LockTimeout)
    }

    /// Destroy every session. Each session's secrets are zeroed as its
    /// `Drop` runs when the last reference is released.
    pub async fn shutdown(&self) {
        let mut map = self.sessions.write().await;
        map.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
