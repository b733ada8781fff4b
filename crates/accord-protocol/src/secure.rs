//! The secure session transport.
//!
//! Owns the [`SessionManager`] and the two handshake drivers; wire
//! frames travel over an injected [`EnvelopeTransport`]. Application
//! messages are sealed under the session key with seal-and-send
//! serialized per session, so one session's envelopes leave in
//! sequence order. The transport is send-only (`receive_message`
//! reports `NotImplemented`) and does not stream; inbound frames
//! enter through [`SecureAdapter::handle_frame`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use accord_core::context::Context;
use accord_core::did::Did;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::message::Message;
use accord_core::security::ProtocolMode;
use accord_crypto::KeyPair;
use accord_session::envelope::{SecureEnvelope, open_message, seal_message};
use accord_session::handshake::{
    COMPLETE_KIND, HandshakeComplete, HandshakeConfig, HandshakeInitiator, HandshakeInvitation,
    HandshakeRequest, HandshakeResponder, HandshakeResponse, INVITATION_KIND, REQUEST_KIND,
    RESPONSE_KIND,
};
use accord_session::manager::SessionManager;
use accord_session::resolver::DidResolver;
use accord_session::session::Session;
use accord_session::signing::verify_fields;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::{ProtocolAdapter, SECURE_ADAPTER_NAME};

/// Everything the secure transport puts on the wire.
///
/// Decoding reads the `kind` discriminator first and dispatches to
/// the concrete frame; unknown kinds are a hard failure.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// Handshake phase 1.
    Invitation(HandshakeInvitation),
    /// Handshake phase 2.
    Request(HandshakeRequest),
    /// Handshake phase 3.
    Response(HandshakeResponse),
    /// Handshake phase 4.
    Complete(HandshakeComplete),
    /// A sealed application message.
    Message(SecureEnvelope),
}

impl WireFrame {
    /// The frame's `kind` discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Invitation(_) => INVITATION_KIND,
            Self::Request(_) => REQUEST_KIND,
            Self::Response(_) => RESPONSE_KIND,
            Self::Complete(_) => COMPLETE_KIND,
            Self::Message(_) => accord_core::message::MESSAGE_KIND,
        }
    }
}

impl Serialize for WireFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Invitation(frame) => frame.serialize(serializer),
            Self::Request(frame) => frame.serialize(serializer),
            Self::Response(frame) => frame.serialize(serializer),
            Self::Complete(frame) => frame.serialize(serializer),
            Self::Message(frame) => frame.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WireFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as DeError;

        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| DeError::custom("wire frame is missing its kind discriminator"))?;

        match kind {
            INVITATION_KIND => serde_json::from_value(value)
                .map(Self::Invitation)
                .map_err(DeError::custom),
            REQUEST_KIND => serde_json::from_value(value)
                .map(Self::Request)
                .map_err(DeError::custom),
            RESPONSE_KIND => serde_json::from_value(value)
                .map(Self::Response)
                .map_err(DeError::custom),
            COMPLETE_KIND => serde_json::from_value(value)
                .map(Self::Complete)
                .map_err(DeError::custom),
            accord_core::message::MESSAGE_KIND => serde_json::from_value(value)
                .map(Self::Message)
                .map_err(DeError::custom),
            other => Err(DeError::custom(format!("unknown wire frame kind {other:?}"))),
        }
    }
}

/// Carries wire frames between secure endpoints.
///
/// `deliver` hands a frame to the peer and may return the peer's
/// immediate reply (request/response transports) or `None`
/// (fire-and-forget transports).
#[async_trait]
pub trait EnvelopeTransport: Send + Sync {
    /// Deliver one frame; optionally return the peer's reply frame.
    async fn deliver(&self, cx: &Context, frame: WireFrame) -> AccordResult<Option<WireFrame>>;
}

/// What [`SecureAdapter::handle_frame`] produced for an inbound
/// frame.
#[derive(Debug)]
pub enum Inbound {
    /// A frame to send back to the peer.
    Reply(WireFrame),
    /// A decrypted, verified application message.
    Delivered(Message),
    /// The frame concluded an exchange; nothing to send.
    Done,
}

/// Per-session ordering locks: seal-and-send is serialized per
/// session id.
type SendLocks = Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// The secure transport adapter.
pub struct SecureAdapter {
    local_did: Did,
    keypair: Arc<KeyPair>,
    manager: Arc<SessionManager>,
    initiator: HandshakeInitiator,
    responder: HandshakeResponder,
    resolver: Arc<dyn DidResolver>,
    transport: Arc<dyn EnvelopeTransport>,
    send_locks: SendLocks,
    max_clock_skew: Duration,
}

impl SecureAdapter {
    /// Build the adapter. It creates and exclusively owns its session
    /// manager; start TTL eviction with
    /// [`start_cleanup`](Self::start_cleanup) once inside a runtime.
    #[must_use]
    pub fn new(
        local_did: Did,
        keypair: Arc<KeyPair>,
        resolver: Arc<dyn DidResolver>,
        transport: Arc<dyn EnvelopeTransport>,
        config: HandshakeConfig,
    ) -> Self {
        let manager = Arc::new(SessionManager::with_ttl(config.session_ttl));
        let max_clock_skew = config.max_clock_skew;
        let initiator = HandshakeInitiator::new(
            Arc::clone(&manager),
            Arc::clone(&keypair),
            local_did.clone(),
            Arc::clone(&resolver),
            config.clone(),
        );
        let responder = HandshakeResponder::new(
            Arc::clone(&manager),
            Arc::clone(&keypair),
            local_did.clone(),
            Arc::clone(&resolver),
            config,
        );
        Self {
            local_did,
            keypair,
            manager,
            initiator,
            responder,
            resolver,
            transport,
            send_locks: Mutex::new(HashMap::new()),
            max_clock_skew,
        }
    }

    /// Our DID.
    #[must_use]
    pub fn local_did(&self) -> &Did {
        &self.local_did
    }

    /// The session manager this adapter owns.
    #[must_use]
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Start periodic session eviction.
    pub fn start_cleanup(&self, interval: Duration) {
        let _token = self.manager.start_cleanup(interval);
    }

    /// Drive the full four-phase handshake toward `remote` over the
    /// transport. Returns the already-active session when one exists.
    ///
    /// # Errors
    ///
    /// Handshake validation errors, `NetworkUnavailable` when the
    /// peer does not reply, and `ProtocolMismatch` when it replies
    /// with the wrong frame.
    pub async fn establish_session(&self, cx: &Context, remote: &Did) -> AccordResult<Session> {
        if let Ok(existing) = self.manager.get_by_did(remote).await
            && existing.is_active()
        {
            return Ok(existing);
        }

        let invitation = self.initiator.initiate(remote).await?;
        let reply = self
            .transport
            .deliver(cx, WireFrame::Invitation(invitation))
            .await?
            .ok_or_else(|| {
                Error::new(ErrorCode::NetworkUnavailable, "peer did not answer the invitation")
            })?;
        let WireFrame::Request(request) = reply else {
            return Err(wrong_frame("handshake_request", reply.kind()));
        };

        let response = self.initiator.process_request(&request).await?;
        let reply = self
            .transport
            .deliver(cx, WireFrame::Response(response))
            .await?
            .ok_or_else(|| {
                Error::new(ErrorCode::NetworkUnavailable, "peer did not answer the response")
            })?;
        let WireFrame::Complete(complete) = reply else {
            return Err(wrong_frame("handshake_complete", reply.kind()));
        };

        let session = self.initiator.process_complete(&complete).await?;
        debug!(session_id = %session.id, remote = %remote, "secure session established");
        Ok(session)
    }

    /// Process one inbound frame: answer handshake phases, open
    /// application envelopes.
    ///
    /// # Errors
    ///
    /// Handshake and envelope validation errors propagate; the
    /// underlying session is already closed and evicted where the
    /// handshake contract requires it.
    pub async fn handle_frame(&self, cx: &Context, frame: WireFrame) -> AccordResult<Inbound> {
        let _ = cx;
        match frame {
            WireFrame::Invitation(invitation) => {
                let request = self.responder.process_invitation(&invitation).await?;
                Ok(Inbound::Reply(WireFrame::Request(request)))
            },
            WireFrame::Request(request) => {
                let response = self.initiator.process_request(&request).await?;
                Ok(Inbound::Reply(WireFrame::Response(response)))
            },
            WireFrame::Response(response) => {
                let complete = self.responder.process_response(&response).await?;
                Ok(Inbound::Reply(WireFrame::Complete(complete)))
            },
            WireFrame::Complete(complete) => {
                self.initiator.process_complete(&complete).await?;
                Ok(Inbound::Done)
            },
            WireFrame::Message(envelope) => {
                let message = self.open_envelope(&envelope).await?;
                Ok(Inbound::Delivered(message))
            },
        }
    }

    /// Verify and decrypt an inbound envelope on its session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session, `InvalidSignature` or
    /// freshness errors from envelope verification.
    pub async fn open_envelope(&self, envelope: &SecureEnvelope) -> AccordResult<Message> {
        let mut session = self.manager.get(&envelope.session_id).await?;
        let peer_key = self.resolver.resolve(&session.remote_did).await?;
        let message = open_message(envelope, &mut session, &peer_key, self.max_clock_skew)?;
        self.manager.update(session).await?;
        Ok(message)
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.send_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// The destination DID of an outbound message: the security
    /// block names the agent the caller wants to reach.
    fn destination(message: &Message) -> AccordResult<Did> {
        message
            .security
            .as_ref()
            .and_then(|security| security.agent_did.clone())
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::MissingField,
                    "secure send requires security.agentDid naming the destination",
                )
            })
    }
}

fn wrong_frame(expected: &str, actual: &str) -> Error {
    Error::new(
        ErrorCode::ProtocolMismatch,
        format!("peer replied with {actual:?}, expected {expected:?}"),
    )
}

#[async_trait]
impl ProtocolAdapter for SecureAdapter {
    fn name(&self) -> &str {
        SECURE_ADAPTER_NAME
    }

    /// Seal and deliver a message on the active session with its
    /// destination. Seal-and-send is serialized per session, so
    /// envelopes leave in sequence order.
    async fn send_message(&self, cx: &Context, message: &Message) -> AccordResult<()> {
        message.validate()?;
        let remote = Self::destination(message)?;

        let session_id = {
            let session = self.manager.get_by_did(&remote).await.map_err(|_| {
                Error::new(
                    ErrorCode::AgentInactive,
                    format!("no session with {remote}; establish one first"),
                )
            })?;
            session.id
        };

        let lock = self.session_lock(&session_id).await;
        let _ordered = lock.lock().await;

        let mut session = self.manager.get(&session_id).await?;
        if !session.is_active() {
            return Err(Error::new(
                ErrorCode::AgentInactive,
                format!("session {session_id} is not active"),
            ));
        }

        let envelope = seal_message(&mut session, message, &self.keypair)?;
        self.manager.update(session).await?;

        let reply = self
            .transport
            .deliver(cx, WireFrame::Message(envelope))
            .await?;
        if let Some(unexpected) = reply {
            debug!(kind = unexpected.kind(), "discarding unsolicited reply frame");
        }
        Ok(())
    }

    /// Verify a message-level signature against the sender's resolved
    /// key. Idempotent; a message without a security block fails
    /// validation, one without a signature fails as unsigned.
    async fn verify(&self, _cx: &Context, message: &Message) -> AccordResult<()> {
        let Some(security) = &message.security else {
            return Err(Error::missing_field("security"));
        };
        security.validate()?;
        if security.mode != ProtocolMode::Secure {
            return Err(Error::new(
                ErrorCode::ProtocolMismatch,
                "verify requires a secure-mode security block",
            ));
        }
        let Some(signature) = security.signature.clone() else {
            return Err(Error::invalid_signature("message carries no signature"));
        };
        let Some(sender) = security.agent_did.clone() else {
            return Err(Error::missing_field("security.agentDid"));
        };

        let key = self.resolver.resolve(&sender).await?;
        let mut unsigned = message.clone();
        if let Some(block) = &mut unsigned.security {
            block.signature = None;
        }
        verify_fields(&unsigned, &signature, &key)
    }
}

impl std::fmt::Debug for SecureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureAdapter")
            .field("local_did", &self.local_did)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_frame_dispatches_on_kind() {
        let invitation = HandshakeInvitation {
            kind: INVITATION_KIND.to_string(),
            from_did: Did::new("did:example:a").unwrap(),
            to_did: Did::new("did:example:b").unwrap(),
            nonce: "n".to_string(),
            ephemeral_public_key: vec![7; 32],
            algorithms: vec![accord_core::security::SignatureAlgorithm::EdDSA],
            capabilities: vec![],
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&WireFrame::Invitation(invitation.clone())).unwrap();
        let frame: WireFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, WireFrame::Invitation(invitation));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result: Result<WireFrame, _> =
            serde_json::from_str(r#"{"kind": "handshake_hello"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let result: Result<WireFrame, _> = serde_json::from_str(r#"{"sessionId": "s1"}"#);
        assert!(result.is_err());
    }
}
