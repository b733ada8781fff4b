//! Bulkhead: bounded concurrency with optional queueing.
//!
//! A fixed number of in-flight slots, backed by a counting semaphore.
//! When all slots are busy, callers wait up to the configured timeout
//! for one to free; with a queue depth configured, at most that many
//! callers may wait, and further arrivals are rejected immediately.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use accord_core::context::Context;
use accord_core::error::{AccordResult, Error, ErrorCode};
use tokio::sync::Semaphore;

/// A concurrency bulkhead around an async operation.
#[derive(Debug)]
pub struct Bulkhead {
    max_concurrent: usize,
    max_queue_depth: usize,
    timeout: Duration,
    slots: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
}

/// Decrements the waiter count when a queued caller stops waiting,
/// on every exit path.
struct QueueGuard(Arc<AtomicUsize>);

impl Drop for QueueGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Bulkhead {
    /// A bulkhead with `max_concurrent` in-flight slots, an unbounded
    /// wait queue, and a 30s slot-acquisition timeout.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            max_queue_depth: 0,
            timeout: Duration::from_secs(30),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bound the number of callers allowed to wait for a slot.
    /// Zero (the default) leaves the queue unbounded.
    #[must_use]
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// How long a caller may wait for an in-flight slot.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Free in-flight slots right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Operations currently holding a slot.
    #[must_use]
    pub fn in_progress(&self) -> usize {
        self.max_concurrent.saturating_sub(self.slots.available_permits())
    }

    /// Callers currently waiting for a slot.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Run `op` inside an in-flight slot.
    ///
    /// # Errors
    ///
    /// - `BulkheadFull` immediately when the queue is at its bound
    /// - `BulkheadFull` when no slot frees within the timeout
    /// - `Canceled` when the context is cancelled while waiting
    /// - the operation's own error otherwise
    pub async fn execute<T, F, Fut>(&self, cx: &Context, op: F) -> AccordResult<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AccordResult<T>> + Send,
    {
        if cx.is_cancelled() {
            return Err(Error::canceled("bulkhead call cancelled"));
        }

        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                if self.max_queue_depth > 0
                    && self.queued.load(Ordering::SeqCst) >= self.max_queue_depth
                {
                    return Err(Error::new(
                        ErrorCode::BulkheadFull,
                        "bulkhead queue is full",
                    ));
                }

                self.queued.fetch_add(1, Ordering::SeqCst);
                let _queue_guard = QueueGuard(Arc::clone(&self.queued));

                tokio::select! {
                    () = cx.cancelled() => {
                        return Err(Error::canceled("bulkhead wait cancelled"));
                    },
                    acquired = tokio::time::timeout(
                        self.timeout,
                        Arc::clone(&self.slots).acquire_owned(),
                    ) => {
                        match acquired {
                            Ok(Ok(permit)) => permit,
                            Ok(Err(_)) => {
                                return Err(Error::internal("bulkhead semaphore closed"));
                            },
                            Err(_) => {
                                return Err(Error::new(
                                    ErrorCode::BulkheadFull,
                                    format!(
                                        "no bulkhead slot freed within {:?}",
                                        self.timeout
                                    ),
                                ));
                            },
                        }
                    },
                }
            },
        };

        let result = op().await;
        drop(permit);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow(duration: Duration) -> impl Future<Output = AccordResult<()>> {
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_saturation_rejects_excess_caller() {
        let bulkhead = Arc::new(
            Bulkhead::new(2)
                .with_queue_depth(0)
                .with_timeout(Duration::from_millis(100)),
        );
        let cx = Context::new();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let bulkhead = Arc::clone(&bulkhead);
            let cx = cx.clone();
            handles.push(tokio::spawn(async move {
                bulkhead
                    .execute(&cx, || slow(Duration::from_millis(200)))
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let full = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.code() == ErrorCode::BulkheadFull))
            .count();
        assert_eq!(ok, 2);
        assert_eq!(full, 1);
    }

    #[tokio::test]
    async fn test_in_progress_never_exceeds_limit() {
        let bulkhead = Arc::new(Bulkhead::new(2).with_timeout(Duration::from_secs(5)));
        let cx = Context::new();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let bulkhead = Arc::clone(&bulkhead);
            let cx = cx.clone();
            handles.push(tokio::spawn(async move {
                bulkhead
                    .execute(&cx, || slow(Duration::from_millis(20)))
                    .await
            }));
        }

        for _ in 0..20 {
            assert!(bulkhead.in_progress() <= 2);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_bounded_queue_fails_fast() {
        let bulkhead = Arc::new(
            Bulkhead::new(1)
                .with_queue_depth(1)
                .with_timeout(Duration::from_secs(5)),
        );
        let cx = Context::new();

        // Occupy the slot.
        let holder = {
            let bulkhead = Arc::clone(&bulkhead);
            let cx = cx.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute(&cx, || slow(Duration::from_millis(200)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fill the queue.
        let queued = {
            let bulkhead = Arc::clone(&bulkhead);
            let cx = cx.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute(&cx, || slow(Duration::from_millis(10)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bulkhead.queue_len(), 1);

        // Queue is at its bound: immediate rejection.
        let result = bulkhead.execute(&cx, || slow(Duration::ZERO)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::BulkheadFull);

        assert!(holder.await.unwrap().is_ok());
        assert!(queued.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_while_queued() {
        let bulkhead = Arc::new(Bulkhead::new(1).with_timeout(Duration::from_secs(30)));
        let cx = Context::new();

        let holder = {
            let bulkhead = Arc::clone(&bulkhead);
            let cx = cx.clone();
            tokio::spawn(async move {
                bulkhead
                    .execute(&cx, || slow(Duration::from_millis(200)))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter_cx = Context::new();
        let token = waiter_cx.cancellation_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = bulkhead.execute(&waiter_cx, || slow(Duration::ZERO)).await;
        assert_eq!(result.unwrap_err().code(), ErrorCode::Canceled);
        assert!(holder.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_counters_settle() {
        let bulkhead = Bulkhead::new(3);
        let cx = Context::new();

        assert_eq!(bulkhead.available(), 3);
        let _ = bulkhead.execute(&cx, || slow(Duration::ZERO)).await;

        assert_eq!(bulkhead.available(), 3);
        assert_eq!(bulkhead.in_progress(), 0);
        assert_eq!(bulkhead.queue_len(), 0);
    }
}
