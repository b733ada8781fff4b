//! Sliding-window rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::message::Message;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use super::{Middleware, Next};

type KeyExtractor = Arc<dyn Fn(&Context, &Message) -> String + Send + Sync>;

/// Tracks request instants inside one sliding window.
#[derive(Debug)]
struct WindowTracker {
    requests: Vec<Instant>,
}

impl WindowTracker {
    fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    /// Record a request if the window has room.
    fn try_request(&mut self, max_requests: usize, window: Duration) -> bool {
        let now = Instant::now();
        self.requests
            .retain(|instant| now.duration_since(*instant) < window);
        if self.requests.len() >= max_requests {
            return false;
        }
        self.requests.push(now);
        true
    }
}

/// Rejects a request when the same key has already made `max_requests`
/// requests within the trailing window.
///
/// The default key is the sender's agent DID when the message carries
/// a security block, falling back to the context request id, then to
/// a single global bucket.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    key_fn: KeyExtractor,
    trackers: Mutex<HashMap<String, WindowTracker>>,
}

impl RateLimiter {
    /// Allow `max_requests` per key within the trailing `window`.
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            key_fn: Arc::new(default_key),
            trackers: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the key extractor.
    #[must_use]
    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&Context, &Message) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }
}

fn default_key(cx: &Context, message: &Message) -> String {
    if let Some(did) = message
        .security
        .as_ref()
        .and_then(|security| security.agent_did.as_ref())
    {
        return did.as_str().to_string();
    }
    cx.request_id().map_or_else(|| "global".to_string(), ToString::to_string)
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn handle(
        &self,
        cx: &mut Context,
        message: Message,
        next: Next<'_>,
    ) -> AccordResult<Message> {
        let key = (self.key_fn)(cx, &message);
        let admitted = {
            let mut trackers = self.trackers.lock().await;
            trackers
                .entry(key.clone())
                .or_insert_with(WindowTracker::new)
                .try_request(self.max_requests, self.window)
        };

        if !admitted {
            warn!(key = %key, "rate limit exceeded");
            return Err(Error::new(
                ErrorCode::RateLimitExceeded,
                format!("rate limit exceeded for {key}"),
            )
            .with_detail("window_ms", u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)));
        }
        next.run(cx, message).await
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
