//! Convenience re-exports.

pub use crate::adapter::{
    ChunkHandler, ProtocolAdapter, StreamChunk, StreamState, adapter_from,
};
pub use crate::middleware::{
    ContentFilter, Handler, Logger, Metadata, Middleware, MiddlewareChain, Next, RateLimiter,
    Recovery, RequestId, Timeout, Timer, Validator, handler_fn,
};
pub use crate::plain::{PlainAdapter, RpcClient};
pub use crate::router::MessageRouter;
pub use crate::secure::{EnvelopeTransport, Inbound, SecureAdapter, WireFrame};
pub use crate::selector::ProtocolSelector;
