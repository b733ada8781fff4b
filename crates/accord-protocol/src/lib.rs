//! Accord Protocol - Message routing across pluggable transports.
//!
//! This crate provides:
//! - The [`ProtocolAdapter`] capability contract
//! - [`ProtocolSelector`]: mode-based and automatic transport choice
//! - [`MessageRouter`]: middleware chain + terminal handler +
//!   send/receive/verify dispatch
//! - The built-in middleware set (request id, logging, timing,
//!   recovery, validation, timeout, rate limiting, metadata, content
//!   filtering)
//! - The plain request/response transport over an injected
//!   [`RpcClient`]
//! - The secure session transport owning the session manager and the
//!   four-phase handshake

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod adapter;
pub mod middleware;
pub mod plain;
pub mod router;
pub mod secure;
pub mod selector;

pub use adapter::{
    ChunkHandler, PLAIN_ADAPTER_NAME, ProtocolAdapter, SECURE_ADAPTER_NAME, StreamChunk,
    StreamState, adapter_from, attach_adapter,
};
pub use middleware::{Handler, HandlerFn, Middleware, MiddlewareChain, Next, handler_fn};
pub use plain::{PlainAdapter, RpcClient};
pub use router::MessageRouter;
pub use secure::{EnvelopeTransport, Inbound, SecureAdapter, WireFrame};
pub use selector::ProtocolSelector;
