//! The plain request/response transport.
//!
//! A thin adapter over an injected [`RpcClient`] — the actual HTTP or
//! gRPC client is an external collaborator. The transport
//! authenticates implicitly (whatever the client's channel provides),
//! so `verify` is a no-op. It is send-only: `receive_message` reports
//! `NotImplemented`.

use std::sync::Arc;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;
use tracing::debug;

use crate::adapter::{ChunkHandler, PLAIN_ADAPTER_NAME, ProtocolAdapter, StreamChunk};

/// The request/response client the plain transport wraps.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Send a message and return the peer's response.
    async fn call(&self, cx: &Context, message: &Message) -> AccordResult<Message>;

    /// Stream the peer's response chunks, where supported.
    async fn call_stream(
        &self,
        cx: &Context,
        message: &Message,
        on_chunk: ChunkHandler<'_>,
    ) -> AccordResult<()> {
        let _ = (cx, message, on_chunk);
        Err(accord_core::error::Error::not_implemented(
            "client does not support streaming",
        ))
    }

    /// Whether [`call_stream`](Self::call_stream) is available.
    fn supports_streaming(&self) -> bool {
        false
    }
}

/// The plain transport adapter.
pub struct PlainAdapter {
    client: Arc<dyn RpcClient>,
}

impl PlainAdapter {
    /// Wrap an RPC client.
    #[must_use]
    pub fn new(client: Arc<dyn RpcClient>) -> Self {
        Self { client }
    }

    /// Request/response round trip.
    ///
    /// # Errors
    ///
    /// Message validation errors, then whatever the client returns.
    pub async fn call(&self, cx: &Context, message: &Message) -> AccordResult<Message> {
        message.validate()?;
        self.client.call(cx, message).await
    }
}

#[async_trait]
impl ProtocolAdapter for PlainAdapter {
    fn name(&self) -> &str {
        PLAIN_ADAPTER_NAME
    }

    async fn send_message(&self, cx: &Context, message: &Message) -> AccordResult<()> {
        message.validate()?;
        let response = self.client.call(cx, message).await?;
        debug!(
            message_id = %message.message_id,
            response_id = %response.message_id,
            "plain send completed"
        );
        Ok(())
    }

    async fn verify(&self, _cx: &Context, _message: &Message) -> AccordResult<()> {
        // The plain channel authenticates implicitly; nothing to check.
        Ok(())
    }

    fn supports_streaming(&self) -> bool {
        self.client.supports_streaming()
    }

    async fn stream(
        &self,
        cx: &Context,
        message: &Message,
        on_chunk: ChunkHandler<'_>,
    ) -> AccordResult<()> {
        message.validate()?;
        match self.client.call_stream(cx, message, on_chunk).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Callers see one final error status and nothing more.
                let _ = on_chunk(StreamChunk::stream_error(err.message()));
                Err(err)
            },
        }
    }
}

impl std::fmt::Debug for PlainAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainAdapter")
            .field("streaming", &self.supports_streaming())
            .finish_non_exhaustive()
    }
}
