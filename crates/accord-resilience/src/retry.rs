//! Retry with configurable backoff.
//!
//! Wraps an async operation and re-runs it on retryable failure,
//! sleeping between attempts. Sleeps race against the caller's
//! cancellation token; exhausting the attempt budget returns
//! `MaxAttemptsExceeded` wrapping the last error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use tracing::debug;

/// Delay schedule between retry attempts.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// The same delay before every retry.
    Constant(Duration),
    /// `base * attempt`, capped.
    Linear {
        /// Delay after the first failure.
        base: Duration,
        /// Upper bound for any delay.
        max: Duration,
    },
    /// `base * multiplier^(attempt-1)`, capped.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Growth factor per attempt.
        multiplier: u32,
        /// Upper bound for any delay.
        max: Duration,
    },
}

impl Backoff {
    /// A constant delay.
    #[must_use]
    pub const fn constant(delay: Duration) -> Self {
        Self::Constant(delay)
    }

    /// A linearly growing delay with a cap.
    #[must_use]
    pub const fn linear(base: Duration, max: Duration) -> Self {
        Self::Linear { base, max }
    }

    /// An exponentially growing delay with a cap.
    #[must_use]
    pub const fn exponential(base: Duration, multiplier: u32, max: Duration) -> Self {
        Self::Exponential {
            base,
            multiplier,
            max,
        }
    }

    /// The delay to sleep after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Constant(delay) => *delay,
            Self::Linear { base, max } => base.saturating_mul(attempt.max(1)).min(*max),
            Self::Exponential {
                base,
                multiplier,
                max,
            } => {
                let mut delay = *base;
                let mut step = 1u32;
                while step < attempt.max(1) {
                    delay = delay.saturating_mul(*multiplier);
                    if delay >= *max {
                        return *max;
                    }
                    step = step.saturating_add(1);
                }
                delay.min(*max)
            },
        }
    }
}

type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;
type RetryObserver = Arc<dyn Fn(u32, &Error) + Send + Sync>;

/// Retry policy for an async operation.
#[derive(Clone)]
pub struct Retry {
    max_attempts: u32,
    backoff: Backoff,
    should_retry: RetryPredicate,
    on_retry: Option<RetryObserver>,
}

impl Retry {
    /// A policy allowing up to `max_attempts` total calls, retrying
    /// every error with a constant 100ms backoff.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::constant(Duration::from_millis(100)),
            should_retry: Arc::new(|_| true),
            on_retry: None,
        }
    }

    /// Set the backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Only retry errors the predicate approves; anything else
    /// surfaces unchanged.
    #[must_use]
    pub fn retry_if(mut self, predicate: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Observe each failed attempt before the backoff sleep.
    #[must_use]
    pub fn on_retry(mut self, observer: impl Fn(u32, &Error) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    /// The attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op`, retrying per this policy.
    ///
    /// # Errors
    ///
    /// - `Canceled` as soon as the context is cancelled
    /// - the operation's own error when the predicate rejects it
    /// - `MaxAttemptsExceeded` wrapping the last error once the
    ///   budget is spent
    pub async fn execute<T, F, Fut>(&self, cx: &Context, mut op: F) -> AccordResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = AccordResult<T>> + Send,
    {
        let mut last_error: Option<Error> = None;

        for attempt in 1..=self.max_attempts {
            if cx.is_cancelled() {
                return Err(Error::canceled("retry aborted: context cancelled"));
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.should_retry)(&err) {
                        return Err(err);
                    }
                    if attempt < self.max_attempts {
                        if let Some(observer) = &self.on_retry {
                            observer(attempt, &err);
                        }
                        let delay = self.backoff.delay(attempt);
                        debug!(attempt, ?delay, error = %err, "retrying after backoff");
                        tokio::select! {
                            () = cx.cancelled() => {
                                return Err(Error::canceled("retry aborted: context cancelled")
                                    .with_cause(err));
                            },
                            () = tokio::time::sleep(delay) => {},
                        }
                    }
                    last_error = Some(err);
                },
            }
        }

        let exhausted = Error::new(
            ErrorCode::MaxAttemptsExceeded,
            format!("operation failed after {} attempts", self.max_attempts),
        );
        Err(match last_error {
            Some(err) => exhausted.with_cause(err),
            None => exhausted,
        })
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
