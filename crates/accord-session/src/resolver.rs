//! DID resolution.
//!
//! The registry holding long-term public keys is an external
//! collaborator; the session layer only needs [`DidResolver`].
//! [`StaticResolver`] is the in-memory implementation used by tests
//! and single-process deployments.

use std::collections::HashMap;

use accord_core::did::Did;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_crypto::PublicKey;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Resolves a DID to the agent's long-term verification key.
#[async_trait]
pub trait DidResolver: Send + Sync {
    /// Resolve `did` to its current Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns `DidNotFound` when the DID is unknown to the backing
    /// registry.
    async fn resolve(&self, did: &Did) -> AccordResult<PublicKey>;
}

/// An in-memory DID registry.
#[derive(Debug, Default)]
pub struct StaticResolver {
    keys: RwLock<HashMap<String, PublicKey>>,
}

impl StaticResolver {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the key for a DID.
    pub async fn register(&self, did: Did, key: PublicKey) {
        self.keys.write().await.insert(did.as_str().to_string(), key);
    }

    /// Remove a DID from the registry. Returns `true` if it was
    /// present.
    pub async fn remove(&self, did: &Did) -> bool {
        self.keys.write().await.remove(did.as_str()).is_some()
    }

    /// Number of registered DIDs.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// True when no DIDs are registered.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}

#[async_trait]
impl DidResolver for StaticResolver {
    async fn resolve(&self, did: &Did) -> AccordResult<PublicKey> {
        self.keys
            .read()
            .await
            .get(did.as_str())
            .copied()
            .ok_or_else(|| {
                Error::new(ErrorCode::DidNotFound, format!("cannot resolve {did}"))
            })
    }
}
