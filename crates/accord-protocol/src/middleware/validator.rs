//! Message validation gate.

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;

use super::{Middleware, Next};

/// Rejects structurally invalid messages before the handler runs:
/// empty id, no parts, invalid parts, or a broken security block.
/// Validation failures are never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Create the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Validator {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        message.validate()?;
        next.run(cx, message).await
    }
}
