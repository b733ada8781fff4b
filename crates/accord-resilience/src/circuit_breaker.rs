//! Circuit breaker.
//!
//! Counts consecutive failures while Closed; trips Open at the
//! configured threshold and rejects calls without running them. After
//! the cooldown the next probe moves the breaker to HalfOpen, which
//! admits a bounded number of concurrent probes: the first success
//! closes the breaker, any failure reopens it.
//!
//! State-change callbacks run on a spawned task, never under the
//! breaker's lock.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use tracing::debug;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// A bounded number of probes may run.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

type StateObserver = Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>;

struct BreakerState {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// A circuit breaker guarding an async operation.
pub struct CircuitBreaker {
    max_failures: u32,
    timeout: Duration,
    max_half_open_requests: u32,
    on_state_change: Option<StateObserver>,
    state: Mutex<BreakerState>,
    rejected: AtomicU32,
}

impl CircuitBreaker {
    /// A breaker tripping after `max_failures` consecutive failures
    /// and cooling down for `timeout` before probing again.
    #[must_use]
    pub fn new(max_failures: u32, timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            timeout,
            max_half_open_requests: 1,
            on_state_change: None,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
            rejected: AtomicU32::new(0),
        }
    }

    /// Admit up to `limit` concurrent probes while HalfOpen.
    #[must_use]
    pub fn with_half_open_limit(mut self, limit: u32) -> Self {
        self.max_half_open_requests = limit.max(1);
        self
    }

    /// Observe state transitions. The callback runs on a spawned
    /// task.
    #[must_use]
    pub fn on_state_change(
        mut self,
        observer: impl Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Arc::new(observer));
        self
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures observed while Closed.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Calls rejected without running since construction.
    #[must_use]
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Force the breaker Closed and clear the failure count.
    pub fn reset(&self) {
        let transition = {
            let mut guard = self.lock();
            let from = guard.state;
            guard.state = CircuitState::Closed;
            guard.failures = 0;
            guard.opened_at = None;
            guard.half_open_in_flight = 0;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        self.notify(transition);
    }

    /// Run `op` if the breaker admits the call.
    ///
    /// # Errors
    ///
    /// - `CircuitBreakerOpen` when the breaker rejects the call; the
    ///   operation is not invoked
    /// - `Canceled` when the context is already cancelled
    /// - the operation's own error otherwise (recorded as a failure)
    pub async fn execute<T, F, Fut>(&self, cx: &Context, op: F) -> AccordResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AccordResult<T>> + Send,
    {
        if cx.is_cancelled() {
            return Err(Error::canceled("circuit breaker call cancelled"));
        }
        self.try_acquire()?;

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            },
            Err(err) => {
                self.record_failure();
                Err(err)
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> AccordResult<()> {
        let transition = {
            let mut guard = self.lock();
            match guard.state {
                CircuitState::Closed => None,
                CircuitState::Open => {
                    let cooled = guard
                        .opened_at
                        .is_some_and(|opened| opened.elapsed() >= self.timeout);
                    if cooled {
                        guard.state = CircuitState::HalfOpen;
                        guard.half_open_in_flight = 1;
                        Some((CircuitState::Open, CircuitState::HalfOpen))
                    } else {
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::new(
                            ErrorCode::CircuitBreakerOpen,
                            "circuit breaker is open",
                        ));
                    }
                },
                CircuitState::HalfOpen => {
                    if guard.half_open_in_flight < self.max_half_open_requests {
                        guard.half_open_in_flight = guard.half_open_in_flight.saturating_add(1);
                        None
                    } else {
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::new(
                            ErrorCode::CircuitBreakerOpen,
                            "circuit breaker is probing",
                        ));
                    }
                },
            }
        };
        self.notify(transition);
        Ok(())
    }

    fn record_success(&self) {
        let transition = {
            let mut guard = self.lock();
            match guard.state {
                CircuitState::HalfOpen => {
                    guard.state = CircuitState::Closed;
                    guard.failures = 0;
                    guard.opened_at = None;
                    guard.half_open_in_flight = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                },
                CircuitState::Closed => {
                    guard.failures = 0;
                    None
                },
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    fn record_failure(&self) {
        let transition = {
            let mut guard = self.lock();
            match guard.state {
                CircuitState::Closed => {
                    guard.failures = guard.failures.saturating_add(1);
                    if guard.failures >= self.max_failures {
                        guard.state = CircuitState::Open;
                        guard.opened_at = Some(Instant::now());
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                },
                CircuitState::HalfOpen => {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                    guard.half_open_in_flight = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                },
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    fn notify(&self, transition: Option<(CircuitState, CircuitState)>) {
        let Some((from, to)) = transition else {
            return;
        };
        debug!(%from, %to, "circuit breaker state change");
        if let Some(observer) = &self.on_state_change {
            let observer = Arc::clone(observer);
            tokio::spawn(async move {
                observer(from, to);
            });
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("max_failures", &self.max_failures)
            .field("timeout", &self.timeout)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn failing() -> AccordResult<()> {
        Err(Error::new(ErrorCode::NetworkUnavailable, "downstream down"))
    }

    #[tokio::test]
    async fn test_opens_after_max_failures_and_skips_fn() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(100)).with_half_open_limit(1);
        let cx = Context::new();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _ = breaker
                .execute(&cx, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { failing() }
                })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result: AccordResult<()> = breaker
            .execute(&cx, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::CircuitBreakerOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 2, "open breaker must not run fn");
    }

    #[tokio::test]
    async fn test_half_open_success_closes_and_resets() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(100)).with_half_open_limit(1);
        let cx = Context::new();

        for _ in 0..2 {
            let _ = breaker.execute(&cx, || async { failing() }).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let result: AccordResult<()> = breaker.execute(&cx, || async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failures(), 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        let cx = Context::new();

        let _ = breaker.execute(&cx, || async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;

        let _ = breaker.execute(&cx, || async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failures_while_closed() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(100));
        let cx = Context::new();

        let _ = breaker.execute(&cx, || async { failing() }).await;
        let _ = breaker.execute(&cx, || async { failing() }).await;
        assert_eq!(breaker.failures(), 2);

        let _ = breaker.execute(&cx, || async { Ok::<(), Error>(()) }).await;
        assert_eq!(breaker.failures(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_force_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let cx = Context::new();

        let _ = breaker.execute(&cx, || async { failing() }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);

        let result = breaker.execute(&cx, || async { Ok::<u8, Error>(1) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_state_change_callback_fires() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100))
            .on_state_change(move |from, to| {
                let _ = tx.send((from, to));
            });
        let cx = Context::new();

        let _ = breaker.execute(&cx, || async { failing() }).await;

        let (from, to) = rx.recv().await.expect("transition observed");
        assert_eq!(from, CircuitState::Closed);
        assert_eq!(to, CircuitState::Open);
    }
}
