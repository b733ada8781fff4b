//! Response timing.

use std::time::Instant;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;

use super::{Middleware, Next};

/// Metadata key the elapsed time is written under.
pub const PROCESSING_TIME_KEY: &str = "processing_time_ms";

/// Records how long the downstream chain took and writes it into the
/// successful response's metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer;

impl Timer {
    /// Create the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Timer {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        let started = Instant::now();
        let mut response = next.run(cx, message).await?;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        response
            .metadata
            .insert(PROCESSING_TIME_KEY.to_string(), elapsed.into());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{MiddlewareChain, handler_fn};
    use accord_core::error::Error;
    use accord_core::message::Part;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_writes_processing_time() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Timer::new()));

        let slow = handler_fn(|_cx, msg: Message| {
            async move {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Ok(Message::reply_to(&msg, vec![Part::text("done")]))
            }
            .boxed()
        });

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("x"), &slow)
            .await
            .unwrap();

        let recorded = response.metadata[PROCESSING_TIME_KEY]
            .as_u64()
            .expect("timing recorded");
        assert!(recorded >= 10);
    }

    #[tokio::test]
    async fn test_failures_carry_no_timing() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Timer::new()));

        let failing = handler_fn(|_cx, _msg: Message| {
            async move { Err(Error::internal("nope")) }.boxed()
        });

        let mut cx = Context::new();
        assert!(
            chain
                .execute(&mut cx, Message::user_text("x"), &failing)
                .await
                .is_err()
        );
    }
}
