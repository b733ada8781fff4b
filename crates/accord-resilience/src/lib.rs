//! Accord Resilience - Fault-handling primitives for message routing.
//!
//! This crate provides:
//! - [`Retry`] with constant, linear, and exponential backoff
//! - [`CircuitBreaker`] with half-open probing
//! - [`Bulkhead`] bounding concurrency with optional queueing
//! - [`Timeout`] deadlines
//!
//! Every primitive exposes `execute(cx, op)` over an async operation
//! returning the workspace's tagged error, and races its suspension
//! points against the context's cancellation token.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod bulkhead;
pub mod circuit_breaker;
pub mod retry;
pub mod timeout;

pub use bulkhead::Bulkhead;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use retry::{Backoff, Retry};
pub use timeout::Timeout;
