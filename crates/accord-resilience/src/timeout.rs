//! Deadline wrapper.
//!
//! Bounds an async operation to a fixed duration; on expiry the
//! operation's future is dropped (releasing whatever it held) and the
//! caller receives the taxonomy `Timeout` code.

use std::future::Future;
use std::time::Duration;

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error};

/// A fixed deadline around an async operation.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// A deadline of `duration`.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured deadline.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Run `op` under the deadline.
    ///
    /// # Errors
    ///
    /// - `Timeout` when the deadline elapses first
    /// - `Canceled` when the context is cancelled first
    /// - the operation's own error otherwise
    pub async fn execute<T, F, Fut>(&self, cx: &Context, op: F) -> AccordResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AccordResult<T>> + Send,
    {
        tokio::select! {
            () = cx.cancelled() => Err(Error::canceled("timed call cancelled")),
            outcome = tokio::time::timeout(self.duration, op()) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "operation exceeded {:?}",
                    self.duration
                ))),
            },
        }
    }
}
