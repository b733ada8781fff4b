//! The transport capability contract.
//!
//! A [`ProtocolAdapter`] is one transport the router can dispatch
//! onto. Adapters are an open set behind a trait; the two shipped
//! implementations are the plain request/response transport and the
//! secure session transport. The router attaches the selected
//! adapter to the request [`Context`] so middleware and handlers stay
//! transport-agnostic.

use std::sync::Arc;

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error};
use accord_core::message::Message;
use accord_core::task::Artifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Terminal state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// The transport is still producing chunks.
    Working,
    /// The stream finished cleanly; no further chunks follow.
    Completed,
    /// The stream failed; no further chunks follow.
    Error,
}

/// One streamed event. Event kinds are stable wire identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Stream lifecycle update.
    Status {
        /// The state entered.
        state: StreamState,
        /// Optional human-readable detail (set on errors).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Incremental text.
    Text {
        /// The text fragment.
        text: String,
    },
    /// A produced artifact.
    Artifact {
        /// The artifact.
        artifact: Artifact,
    },
}

impl StreamChunk {
    /// A `working` status chunk.
    #[must_use]
    pub fn working() -> Self {
        Self::Status {
            state: StreamState::Working,
            detail: None,
        }
    }

    /// A `completed` status chunk.
    #[must_use]
    pub fn completed() -> Self {
        Self::Status {
            state: StreamState::Completed,
            detail: None,
        }
    }

    /// A final `error` status chunk.
    #[must_use]
    pub fn stream_error(detail: impl Into<String>) -> Self {
        Self::Status {
            state: StreamState::Error,
            detail: Some(detail.into()),
        }
    }

    /// A text chunk.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Callback receiving stream chunks. Returning an error aborts the
/// stream.
pub type ChunkHandler<'a> = &'a mut (dyn FnMut(StreamChunk) -> AccordResult<()> + Send);

/// A transport the router can dispatch messages onto.
///
/// `send_message` must be safe for concurrent use; `verify` is
/// idempotent. Both shipped transports are send-only:
/// `receive_message` reports `NotImplemented` by default and the
/// router surfaces that to callers.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Stable adapter identifier. `plain` and `secure` are reserved
    /// for the shipped transports.
    fn name(&self) -> &str;

    /// Deliver a message to the peer.
    async fn send_message(&self, cx: &Context, message: &Message) -> AccordResult<()>;

    /// Pull one inbound message, where the transport supports it.
    async fn receive_message(&self, cx: &Context) -> AccordResult<Message> {
        let _ = cx;
        Err(Error::not_implemented(format!(
            "{} transport does not support receive",
            self.name()
        )))
    }

    /// Check a message's authenticity. A no-op for transports that
    /// authenticate implicitly.
    async fn verify(&self, cx: &Context, message: &Message) -> AccordResult<()>;

    /// Whether [`stream`](Self::stream) is available.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Stream the response to `message` through `on_chunk`. The
    /// callback is invoked zero or more times; its error aborts the
    /// stream.
    async fn stream(
        &self,
        cx: &Context,
        message: &Message,
        on_chunk: ChunkHandler<'_>,
    ) -> AccordResult<()> {
        let _ = (cx, message, on_chunk);
        Err(Error::not_implemented(format!(
            "{} transport does not support streaming",
            self.name()
        )))
    }
}

/// Reserved name of the plain transport.
pub const PLAIN_ADAPTER_NAME: &str = "plain";

/// Reserved name of the secure transport.
pub const SECURE_ADAPTER_NAME: &str = "secure";

const ADAPTER_EXTENSION_KEY: &str = "accord.protocol.adapter";

struct AdapterExtension(Arc<dyn ProtocolAdapter>);

/// Attach the selected adapter to the request context.
///
/// Middleware and handlers read it back with [`adapter_from`]; only
/// the adapter name is exposed through
/// [`Context::adapter_name`](accord_core::context::Context::adapter_name).
pub fn attach_adapter(cx: &mut Context, adapter: Arc<dyn ProtocolAdapter>) {
    cx.set_adapter_name(adapter.name());
    cx.insert_extension(ADAPTER_EXTENSION_KEY, Arc::new(AdapterExtension(adapter)));
}

/// The adapter the router attached to this request, if any.
#[must_use]
pub fn adapter_from(cx: &Context) -> Option<Arc<dyn ProtocolAdapter>> {
    cx.extension(ADAPTER_EXTENSION_KEY)?
        .downcast_ref::<AdapterExtension>()
        .map(|ext| Arc::clone(&ext.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;

    #[async_trait]
    impl ProtocolAdapter for NullAdapter {
        fn name(&self) -> &str {
            "null"
        }

        async fn send_message(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
            Ok(())
        }

        async fn verify(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_receive_is_not_implemented() {
        let adapter = NullAdapter;
        let err = adapter.receive_message(&Context::new()).await.unwrap_err();
        assert_eq!(err.code(), accord_core::error::ErrorCode::NotImplemented);
    }

    #[tokio::test]
    async fn test_default_stream_is_not_implemented() {
        let adapter = NullAdapter;
        let msg = Message::user_text("x");
        let mut sink = |_chunk: StreamChunk| Ok(());
        let err = adapter
            .stream(&Context::new(), &msg, &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err.code(), accord_core::error::ErrorCode::NotImplemented);
    }

    #[test]
    fn test_attach_and_read_back() {
        let mut cx = Context::new();
        let adapter: Arc<dyn ProtocolAdapter> = Arc::new(NullAdapter);

        attach_adapter(&mut cx, Arc::clone(&adapter));

        assert_eq!(cx.adapter_name(), Some("null"));
        let read_back = adapter_from(&cx).expect("adapter attached");
        assert_eq!(read_back.name(), "null");
    }

    #[test]
    fn test_chunk_wire_kinds() {
        let json = serde_json::to_value(StreamChunk::working()).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["state"], "working");

        let json = serde_json::to_value(StreamChunk::text("hi")).unwrap();
        assert_eq!(json["kind"], "text");

        let json = serde_json::to_value(StreamChunk::stream_error("boom")).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["detail"], "boom");
    }
}
