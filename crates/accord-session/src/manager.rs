//! Session storage, indexing, and TTL eviction.
//!
//! The manager owns every session: a primary `id → Session` map plus
//! a `remote DID → id` index, both behind one read/write lock.
//! Reads take the shared lock and return clones; mutations write back
//! through [`SessionManager::update`]. A cleanup loop sweeps expired
//! sessions on an interval and on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use accord_core::did::Did;
use accord_core::error::{AccordResult, Error};
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{Session, SessionStatus};

/// Default session TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default sweep interval for the cleanup loop.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

struct Registry {
    by_id: HashMap<String, Session>,
    by_did: HashMap<String, String>,
}

/// Owner of all sessions for one secure endpoint.
pub struct SessionManager {
    registry: RwLock<Registry>,
    ttl: Duration,
    cleanup_token: std::sync::Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    /// A manager issuing sessions with the default TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// A manager issuing sessions with the given TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            registry: RwLock::new(Registry {
                by_id: HashMap::new(),
                by_did: HashMap::new(),
            }),
            ttl,
            cleanup_token: std::sync::Mutex::new(None),
        }
    }

    /// The TTL applied to new sessions.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session for `(local, remote)`, or return the existing
    /// active one.
    ///
    /// At most one non-terminal session exists per remote DID: a
    /// stale non-active entry is evicted before the fresh session is
    /// indexed.
    pub async fn create(&self, local: &Did, remote: &Did) -> Session {
        let mut registry = self.registry.write().await;

        if let Some(existing_id) = registry.by_did.get(remote.as_str()).cloned() {
            if let Some(existing) = registry.by_id.get(&existing_id)
                && existing.is_active()
            {
                return existing.clone();
            }
            // Stale entry: drop it so the new session takes the index.
            registry.by_id.remove(&existing_id);
            registry.by_did.remove(remote.as_str());
        }

        let session = Session::new(local.clone(), remote.clone(), self.ttl);
        registry
            .by_did
            .insert(remote.as_str().to_string(), session.id.clone());
        registry.by_id.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, remote = %remote, "session created");
        session
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown or the session has
    /// expired.
    pub async fn get(&self, id: &str) -> AccordResult<Session> {
        let registry = self.registry.read().await;
        match registry.by_id.get(id) {
            Some(session) if !session.is_expired() => Ok(session.clone()),
            Some(_) => Err(Error::not_found(format!("session {id} has expired"))),
            None => Err(Error::not_found(format!("session {id} not found"))),
        }
    }

    /// Fetch the session indexed for a remote DID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no live session is indexed for the DID.
    pub async fn get_by_did(&self, remote: &Did) -> AccordResult<Session> {
        let registry = self.registry.read().await;
        let id = registry
            .by_did
            .get(remote.as_str())
            .ok_or_else(|| Error::not_found(format!("no session for {remote}")))?;
        match registry.by_id.get(id) {
            Some(session) if !session.is_expired() => Ok(session.clone()),
            _ => Err(Error::not_found(format!("no live session for {remote}"))),
        }
    }

    /// Write back a mutated session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session is no longer registered —
    /// identity is preserved, never re-created, by write-back.
    pub async fn update(&self, session: Session) -> AccordResult<()> {
        let mut registry = self.registry.write().await;
        if !registry.by_id.contains_key(&session.id) {
            return Err(Error::not_found(format!(
                "session {} not found for update",
                session.id
            )));
        }
        registry
            .by_did
            .insert(session.remote_did.as_str().to_string(), session.id.clone());
        registry.by_id.insert(session.id.clone(), session);
        Ok(())
    }

    /// Re-key a session under a new id, preserving everything else.
    ///
    /// The handshake initiator adopts the responder-issued session id
    /// when processing the request phase, so both peers converge on
    /// one identifier.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `old_id` is unknown.
    pub async fn adopt_id(&self, old_id: &str, new_id: &str) -> AccordResult<Session> {
        let mut registry = self.registry.write().await;
        let Some(mut session) = registry.by_id.remove(old_id) else {
            return Err(Error::not_found(format!("session {old_id} not found")));
        };
        session.id = new_id.to_string();
        registry
            .by_did
            .insert(session.remote_did.as_str().to_string(), session.id.clone());
        registry.by_id.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Remove a session from the primary map and the DID index.
    ///
    /// Returns `true` if the session was present.
    pub async fn delete(&self, id: &str) -> bool {
        let mut registry = self.registry.write().await;
        let Some(session) = registry.by_id.remove(id) else {
            return false;
        };
        if registry
            .by_did
            .get(session.remote_did.as_str())
            .is_some_and(|indexed| indexed == id)
        {
            registry.by_did.remove(session.remote_did.as_str());
        }
        true
    }

    /// Mark a session closed (wiping its secrets) and evict it.
    pub async fn close_and_evict(&self, id: &str) {
        {
            let mut registry = self.registry.write().await;
            if let Some(session) = registry.by_id.get_mut(id)
                && session.transition(SessionStatus::Closed).is_err()
            {
                // Already terminal; wiping is still guaranteed.
                session.wipe_secrets();
            }
        }
        self.delete(id).await;
    }

    /// Sweep expired sessions; returns how many were evicted.
    ///
    /// Holds the write lock only for the sweep itself.
    pub async fn cleanup(&self) -> usize {
        let now = Utc::now();
        let mut registry = self.registry.write().await;

        let expired: Vec<String> = registry
            .by_id
            .values()
            .filter(|s| s.expires_at <= now || s.status() == SessionStatus::Expired)
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            if let Some(mut session) = registry.by_id.remove(id) {
                if session.transition(SessionStatus::Expired).is_err() {
                    session.wipe_secrets();
                }
                if registry
                    .by_did
                    .get(session.remote_did.as_str())
                    .is_some_and(|indexed| indexed == id)
                {
                    registry.by_did.remove(session.remote_did.as_str());
                }
            }
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "expired sessions evicted");
        }
        expired.len()
    }

    /// Snapshot of all registered sessions.
    pub async fn list(&self) -> Vec<Session> {
        self.registry.read().await.by_id.values().cloned().collect()
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.registry.read().await.by_id.len()
    }

    /// Start the periodic cleanup loop.
    ///
    /// The loop stops when the returned token is cancelled or the
    /// manager is dropped. Calling this again replaces (and stops)
    /// the previous loop.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let manager = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let evicted = manager.cleanup().await;
                        if evicted > 0 {
                            debug!(evicted, "cleanup sweep");
                        }
                    },
                }
            }
        });

        let mut slot = self
            .cleanup_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let slot = self
            .cleanup_token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dids() -> (Did, Did) {
        (
            Did::new("did:example:alice").unwrap(),
            Did::new("did:example:bob").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let session = manager.create(&local, &remote).await;
        let fetched = manager.get(&session.id).await.unwrap();

        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.remote_did, remote);
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_create_returns_existing_active_session() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let mut session = manager.create(&local, &remote).await;
        session.transition(SessionStatus::Establishing).unwrap();
        session.transition(SessionStatus::Active).unwrap();
        manager.update(session.clone()).await.unwrap();

        let again = manager.create(&local, &remote).await;
        assert_eq!(again.id, session.id, "active session is reused");
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_create_replaces_stale_pending_session() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let first = manager.create(&local, &remote).await;
        let second = manager.create(&local, &remote).await;

        assert_ne!(first.id, second.id, "pending session is not reused");
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_get_by_did() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let session = manager.create(&local, &remote).await;
        let fetched = manager.get_by_did(&remote).await.unwrap();
        assert_eq!(fetched.id, session.id);

        let unknown = Did::new("did:example:nobody").unwrap();
        assert!(manager.get_by_did(&unknown).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_get_expired_is_not_found() {
        let manager = SessionManager::with_ttl(Duration::ZERO);
        let (local, remote) = dids();

        let session = manager.create(&local, &remote).await;
        let err = manager.get(&session.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_requires_existing_session() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let ghost = Session::new(local, remote, Duration::from_secs(60));
        assert!(manager.update(ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_adopt_id_preserves_session_and_index() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let session = manager.create(&local, &remote).await;
        let adopted = manager.adopt_id(&session.id, "responder-issued").await.unwrap();

        assert_eq!(adopted.id, "responder-issued");
        assert_eq!(adopted.remote_did, remote);
        assert!(manager.get(&session.id).await.is_err());
        assert_eq!(
            manager.get_by_did(&remote).await.unwrap().id,
            "responder-issued"
        );
    }

    #[tokio::test]
    async fn test_delete_clears_both_maps() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        let session = manager.create(&local, &remote).await;
        assert!(manager.delete(&session.id).await);
        assert!(!manager.delete(&session.id).await);
        assert!(manager.get(&session.id).await.is_err());
        assert!(manager.get_by_did(&remote).await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_expired() {
        let manager = SessionManager::with_ttl(Duration::ZERO);
        let (local, remote) = dids();
        let other = Did::new("did:example:carol").unwrap();

        manager.create(&local, &remote).await;
        manager.create(&local, &other).await;
        assert_eq!(manager.count().await, 2);

        let evicted = manager.cleanup().await;
        assert_eq!(evicted, 2);
        assert_eq!(manager.count().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_sessions() {
        let manager = SessionManager::new();
        let (local, remote) = dids();

        manager.create(&local, &remote).await;
        assert_eq!(manager.cleanup().await, 0);
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_cleanup_loop_runs() {
        let manager = Arc::new(SessionManager::with_ttl(Duration::ZERO));
        let (local, remote) = dids();
        manager.create(&local, &remote).await;

        let token = manager.start_cleanup(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.count().await, 0);
        token.cancel();
    }
}
