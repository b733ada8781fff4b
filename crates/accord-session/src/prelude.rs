//! Convenience re-exports.

pub use crate::envelope::{SecureEnvelope, open_message, seal_message, verify_envelope};
pub use crate::handshake::{
    HandshakeComplete, HandshakeConfig, HandshakeInitiator, HandshakeInvitation,
    HandshakeRequest, HandshakeResponder, HandshakeResponse,
};
pub use crate::manager::SessionManager;
pub use crate::resolver::{DidResolver, StaticResolver};
pub use crate::session::{Session, SessionStatus};
