//! Request id assignment.

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;
use uuid::Uuid;

use super::{Middleware, Next};

/// Ensures the context carries a request id: the message id when set,
/// a generated UUID otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl RequestId {
    /// Create the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for RequestId {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        if cx.request_id().is_none() {
            if message.message_id.is_empty() {
                cx.set_request_id(Uuid::new_v4().to_string());
            } else {
                cx.set_request_id(message.message_id.clone());
            }
        }
        next.run(cx, message).await
    }
}
