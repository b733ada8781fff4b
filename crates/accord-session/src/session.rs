//! Session state and lifecycle.
//!
//! A [`Session`] is an authenticated channel between two DIDs, keyed
//! by the session key agreed during the handshake. Status moves
//! `Pending → Establishing → Active`, then terminally to `Expired` or
//! `Closed`; key material is wiped the moment a terminal status is
//! entered.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use accord_core::did::Did;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_crypto::{EphemeralKeyPair, SessionKey, SharedSecret};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, handshake not yet started.
    Pending,
    /// Handshake in flight.
    Establishing,
    /// Handshake complete; envelopes may flow.
    Active,
    /// TTL elapsed.
    Expired,
    /// Closed explicitly or after a handshake failure.
    Closed,
}

impl SessionStatus {
    /// True for statuses a session can never leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Closed)
    }

    /// Whether a transition to `next` is legal.
    #[must_use]
    pub const fn can_transition(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Establishing | Self::Expired | Self::Closed),
            Self::Establishing => {
                matches!(next, Self::Active | Self::Expired | Self::Closed)
            },
            Self::Active => matches!(next, Self::Expired | Self::Closed),
            Self::Expired | Self::Closed => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Establishing => "establishing",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Generate a fresh session id: 16 random bytes, hex-encoded.
#[must_use]
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a fresh handshake nonce: 16 random bytes, hex-encoded.
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// An authenticated channel between two DIDs.
#[derive(Clone)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Our DID.
    pub local_did: Did,
    /// The peer's DID.
    pub remote_did: Did,
    status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last send, receive, or handshake progress.
    pub last_active_at: DateTime<Utc>,
    /// When the session stops being usable.
    pub expires_at: DateTime<Utc>,
    /// Nonce we issued during the handshake.
    pub local_nonce: Option<String>,
    /// Nonce the peer issued during the handshake.
    pub remote_nonce: Option<String>,
    ephemeral: Option<EphemeralKeyPair>,
    shared_secret: Option<SharedSecret>,
    session_key: Option<SessionKey>,
    /// Envelopes sealed on this session.
    pub messages_sent: u64,
    /// Envelopes opened on this session.
    pub messages_received: u64,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, Value>,
}

impl Session {
    /// Create a pending session between `local` and `remote` with the
    /// given TTL.
    #[must_use]
    // Safety: session TTLs are nowhere near DateTime's range limits.
    #[allow(clippy::arithmetic_side_effects)]
    pub fn new(local: Did, remote: Did, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: generate_session_id(),
            local_did: local,
            remote_did: remote,
            status: SessionStatus::Pending,
            created_at: now,
            last_active_at: now,
            expires_at: now + ttl,
            local_nonce: None,
            remote_nonce: None,
            ephemeral: None,
            shared_secret: None,
            session_key: None,
            messages_sent: 0,
            messages_received: 0,
            metadata: BTreeMap::new(),
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Active and not past its TTL.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && self.expires_at > Utc::now()
    }

    /// Marked expired, or past its TTL regardless of status.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.status == SessionStatus::Expired || self.expires_at <= Utc::now()
    }

    /// Move to a new status.
    ///
    /// Entering a terminal status wipes nonces and key material.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for an illegal transition.
    pub fn transition(&mut self, next: SessionStatus) -> AccordResult<()> {
        if !self.status.can_transition(next) {
            return Err(Error::new(
                ErrorCode::InvalidValue,
                format!(
                    "session {} cannot move from {} to {next}",
                    self.id, self.status
                ),
            ));
        }
        self.status = next;
        self.touch();
        if next.is_terminal() {
            self.wipe_secrets();
        }
        Ok(())
    }

    /// Refresh the last-activity timestamp.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Count a sealed envelope and return its sequence number.
    pub fn record_sent(&mut self) -> u64 {
        let sequence = self.messages_sent;
        self.messages_sent = self.messages_sent.saturating_add(1);
        self.touch();
        sequence
    }

    /// Count an opened envelope.
    pub fn record_received(&mut self) {
        self.messages_received = self.messages_received.saturating_add(1);
        self.touch();
    }

    /// Store the ephemeral pair generated for this handshake.
    pub fn set_ephemeral(&mut self, pair: EphemeralKeyPair) {
        self.ephemeral = Some(pair);
    }

    /// The stored ephemeral pair, while the handshake is in flight.
    #[must_use]
    pub fn ephemeral(&self) -> Option<&EphemeralKeyPair> {
        self.ephemeral.as_ref()
    }

    /// Store the derived shared secret.
    pub fn set_shared_secret(&mut self, shared: SharedSecret) {
        self.shared_secret = Some(shared);
    }

    /// The stored shared secret, while the handshake is in flight.
    #[must_use]
    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.shared_secret.as_ref()
    }

    /// Store the agreed session key.
    pub fn set_session_key(&mut self, key: SessionKey) {
        self.session_key = Some(key);
    }

    /// The session key, once agreed.
    #[must_use]
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Drop nonces and key material. The zeroizing wrappers clear the
    /// underlying bytes.
    pub fn wipe_secrets(&mut self) {
        self.local_nonce = None;
        self.remote_nonce = None;
        self.ephemeral = None;
        self.shared_secret = None;
        self.session_key = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("local_did", &self.local_did)
            .field("remote_did", &self.remote_did)
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .field("messages_sent", &self.messages_sent)
            .field("messages_received", &self.messages_received)
            .field("has_session_key", &self.session_key.is_some())
            .finish_non_exhaustive()
    }
}
