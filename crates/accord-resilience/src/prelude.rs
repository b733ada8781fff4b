//! Convenience re-exports.

pub use crate::bulkhead::Bulkhead;
pub use crate::circuit_breaker::{CircuitBreaker, CircuitState};
pub use crate::retry::{Backoff, Retry};
pub use crate::timeout::Timeout;
