//! Accord Session - The secure session layer for agent-to-agent
//! messaging.
//!
//! This crate provides:
//! - [`Session`] lifecycle with TTL and secret wiping
//! - [`SessionManager`]: storage, DID indexing, periodic eviction
//! - The four-phase handshake ([`HandshakeInitiator`] /
//!   [`HandshakeResponder`]): mutual DID authentication, ephemeral
//!   X25519 agreement, session key installation
//! - [`SecureEnvelope`] sealing and opening for application messages
//! - The [`DidResolver`] contract to the external key registry

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod envelope;
pub mod handshake;
pub mod manager;
pub mod resolver;
pub mod session;
pub mod signing;

pub use envelope::{SecureEnvelope, open_message, seal_message, verify_envelope};
pub use handshake::{
    HandshakeComplete, HandshakeConfig, HandshakeInitiator, HandshakeInvitation,
    HandshakeRequest, HandshakeResponder, HandshakeResponse,
};
pub use manager::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_TTL, SessionManager};
pub use resolver::{DidResolver, StaticResolver};
pub use session::{Session, SessionStatus};
