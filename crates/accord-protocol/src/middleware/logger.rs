//! Structured request logging.

use std::time::Instant;

use accord_core::context::Context;
use accord_core::error::AccordResult;
use accord_core::message::Message;
use async_trait::async_trait;
use tracing::{error, info};

use super::{Middleware, Next};

/// Emits an incoming record before the handler and a completion or
/// failure record (with duration) after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Logger {
    /// Create the middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for Logger {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        let started = Instant::now();
        info!(
            request_id = cx.request_id().unwrap_or("-"),
            message_id = %message.message_id,
            role = %message.role,
            adapter = cx.adapter_name().unwrap_or("-"),
            "message received"
        );

        let result = next.run(cx, message).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => info!(
                request_id = cx.request_id().unwrap_or("-"),
                response_id = %response.message_id,
                duration_ms,
                "message handled"
            ),
            Err(err) => error!(
                request_id = cx.request_id().unwrap_or("-"),
                error = %err,
                duration_ms,
                "message failed"
            ),
        }
        result
    }
}
