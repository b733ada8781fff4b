//! Request-scoped context.
//!
//! A [`Context`] travels with every routed message: through the
//! middleware chain, into the terminal handler, and down into the
//! resilience primitives. It carries the request id, the start
//! instant, the active adapter name, attached metadata, a typed
//! extension store, and the cancellation token every suspension point
//! races against.
//!
//! Storage keys are private to this module; all access goes through
//! accessor methods so call sites stay decoupled from the layout.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Per-request state threaded through the routing pipeline.
#[derive(Clone)]
pub struct Context {
    request_id: Option<String>,
    started_at: Instant,
    adapter_name: Option<String>,
    metadata: BTreeMap<String, Value>,
    extensions: BTreeMap<&'static str, Arc<dyn Any + Send + Sync>>,
    cancel: CancellationToken,
}

impl Context {
    /// A fresh context with its own cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// A fresh context cancelled when `cancel` is.
    #[must_use]
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            request_id: None,
            started_at: Instant::now(),
            adapter_name: None,
            metadata: BTreeMap::new(),
            extensions: BTreeMap::new(),
            cancel,
        }
    }

    /// The request id, if one has been assigned.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Assign the request id.
    pub fn set_request_id(&mut self, request_id: impl Into<String>) {
        self.request_id = Some(request_id.into());
    }

    /// When this request entered the pipeline.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time spent in the pipeline so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Name of the adapter the router selected, if any.
    #[must_use]
    pub fn adapter_name(&self) -> Option<&str> {
        self.adapter_name.as_deref()
    }

    /// Record the adapter the router selected.
    pub fn set_adapter_name(&mut self, name: impl Into<String>) {
        self.adapter_name = Some(name.into());
    }

    /// Metadata attached to this request.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Attach a metadata entry.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Store a typed extension under a static key.
    ///
    /// Components use this to attach shared handles (for example the
    /// selected adapter) without the context depending on their types.
    pub fn insert_extension(&mut self, key: &'static str, value: Arc<dyn Any + Send + Sync>) {
        self.extensions.insert(key, value);
    }

    /// Fetch a typed extension by key.
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.extensions.get(key)
    }

    /// The cancellation token governing this request.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("adapter_name", &self.adapter_name)
            .field("metadata", &self.metadata)
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_accessors() {
        let mut cx = Context::new();
        assert!(cx.request_id().is_none());

        cx.set_request_id("req-1");
        assert_eq!(cx.request_id(), Some("req-1"));
    }

    #[test]
    fn test_adapter_name_accessors() {
        let mut cx = Context::new();
        cx.set_adapter_name("plain");
        assert_eq!(cx.adapter_name(), Some("plain"));
    }

    #[test]
    fn test_metadata_accumulates() {
        let mut cx = Context::new();
        cx.insert_metadata("tenant", "acme");
        cx.insert_metadata("attempt", 2);

        assert_eq!(cx.metadata().len(), 2);
        assert_eq!(cx.metadata()["tenant"], "acme");
    }

    #[test]
    fn test_extension_downcast() {
        struct Marker(u32);

        let mut cx = Context::new();
        cx.insert_extension("probe", Arc::new(Marker(7)));

        let marker = cx
            .extension("probe")
            .and_then(|ext| ext.downcast_ref::<Marker>())
            .expect("extension present");
        assert_eq!(marker.0, 7);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let token = CancellationToken::new();
        let cx = Context::with_cancellation(token.clone());
        assert!(!cx.is_cancelled());

        token.cancel();
        assert!(cx.is_cancelled());
        cx.cancelled().await;
    }

    #[test]
    fn test_clone_shares_cancellation() {
        let cx = Context::new();
        let copy = cx.clone();

        cx.cancellation_token().cancel();
        assert!(copy.is_cancelled());
    }
}
