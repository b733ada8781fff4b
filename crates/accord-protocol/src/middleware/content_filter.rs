//! Text content filtering.

use std::sync::Arc;

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::message::{Message, Part};
use async_trait::async_trait;

use super::{Middleware, Next};

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Rejects a message when any of its text parts fails the predicate.
/// Non-text parts pass through untouched.
pub struct ContentFilter {
    allow: Predicate,
}

impl ContentFilter {
    /// Accept messages whose every text part satisfies `allow`.
    #[must_use]
    pub fn new(allow: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            allow: Arc::new(allow),
        }
    }
}

#[async_trait]
impl Middleware for ContentFilter {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        for part in &message.parts {
            if let Part::Text { text } = part
                && !(self.allow)(text)
            {
                return Err(Error::new(
                    ErrorCode::InvalidInput,
                    "message content rejected by filter",
                ));
            }
        }
        next.run(cx, message).await
    }
}

impl std::fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFilter").finish_non_exhaustive()
    }
}
