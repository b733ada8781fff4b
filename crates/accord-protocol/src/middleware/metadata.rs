//! Constant metadata attachment.

use std::collections::BTreeMap;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;
use serde_json::Value;

use super::{Middleware, Next};

/// Attaches a fixed metadata set to the request context and to every
/// successful response. Keys the handler already set on the response
/// win.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
}

impl Metadata {
    /// Create the middleware from a metadata map.
    #[must_use]
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    /// Add one entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl Middleware for Metadata {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        for (key, value) in &self.entries {
            cx.insert_metadata(key.clone(), value.clone());
        }

        let mut response = next.run(cx, message).await?;
        for (key, value) in &self.entries {
            response
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{MiddlewareChain, handler_fn};
    use accord_core::message::Part;
    use futures::FutureExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_attaches_to_context_and_response() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Metadata::default().with("service", "accord")));

        let echo = handler_fn(|_cx, msg: Message| {
            async move { Ok(Message::reply_to(&msg, vec![Part::text("ok")])) }.boxed()
        });

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("x"), &echo)
            .await
            .unwrap();

        assert_eq!(cx.metadata()["service"], "accord");
        assert_eq!(response.metadata["service"], "accord");
    }

    #[tokio::test]
    async fn test_handler_values_win() {
        let mut chain = MiddlewareChain::new();
        chain.push(Arc::new(Metadata::default().with("source", "middleware")));

        let opinionated = handler_fn(|_cx, msg: Message| {
            async move {
                Ok(Message::reply_to(&msg, vec![Part::text("ok")])
                    .with_metadata("source", "handler"))
            }
            .boxed()
        });

        let mut cx = Context::new();
        let response = chain
            .execute(&mut cx, Message::user_text("x"), &opinionated)
            .await
            .unwrap();
        assert_eq!(response.metadata["source"], "handler");
    }
}
