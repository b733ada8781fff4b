//! Panic recovery.

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error};
use accord_core::message::Message;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use super::{Middleware, Next};

/// Catches panics from the downstream chain and surfaces them as an
/// internal "panic recovered" error instead of unwinding into the
/// router.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

impl Recovery {
    /// Create the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl Middleware for Recovery {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        match std::panic::AssertUnwindSafe(next.run(cx, message))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(panic = %detail, "panic recovered in handler chain");
                Err(Error::internal(format!("panic recovered: {detail}")))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{MiddlewareChain, handler_fn};
    use accord_core::error::ErrorCode;
    use accord_core::message::Part;
    use futures::FutureExt as _;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Recovery::new()));

        let exploding = handler_fn(|_cx, _msg: Message| {
            async move { panic!("handler exploded") }.boxed()
        });

        let mut cx = Context::new();
        let err = chain
            .execute(&mut cx, Message::user_text("x"), &exploding)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::Internal);
        assert!(err.message().contains("panic recovered"));
        assert!(err.message().contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_normal_flow_untouched() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Recovery::new()));

        let ok = handler_fn(|_cx, msg: Message| {
            async move { Ok(Message::reply_to(&msg, vec![Part::text("calm")])) }.boxed()
        });

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("x"), &ok)
            .await
            .unwrap();
        assert_eq!(response.text(), "calm");
    }
}
