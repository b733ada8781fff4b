//! Handler deadline.

use std::time::Duration;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;

use super::{Middleware, Next};

/// Bounds the downstream chain to a fixed duration. On expiry the
/// downstream future is dropped — releasing whatever it held — and
/// the caller receives the taxonomy `Timeout` error.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    deadline: accord_resilience::Timeout,
}

impl Timeout {
    /// Bound the chain below this middleware to `duration`.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: accord_resilience::Timeout::new(duration),
        }
    }
}

#[async_trait]
impl Middleware for Timeout {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        // A clone shares the cancellation token, freeing `cx` for the
        // downstream chain.
        let deadline_cx = cx.clone();
        self.deadline
            .execute(&deadline_cx, || next.run(cx, message))
            .await
    }
}
