//! Four-phase handshake.
//!
//! Two agents authenticate each other by DID, agree on a shared
//! secret via ephemeral X25519, and install a session key:
//!
//! | Phase | Sender | Carries |
//! |-------|--------|---------|
//! | 1 invitation | initiator | nonce A, ephemeral public A — unsigned |
//! | 2 request | responder | session id, nonce B, ephemeral public B, `enc_shared{nonce A, nonce B, proposal}` — signed |
//! | 3 response | initiator | `enc_shared{nonce B, session key, expiry}` — signed |
//! | 4 complete | responder | `enc_session{"session_established"}` — signed |
//!
//! The responder activates its session immediately after emitting
//! phase 4; the initiator activates on validating it. Any validation
//! or decryption failure closes and evicts the session — replays are
//! rejected, never retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use accord_core::did::Did;
use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::security::{SignatureAlgorithm, SignatureData};
use accord_crypto::aead::{
    SealedBox, decrypt_with_session_key, decrypt_with_shared_secret, encrypt_with_session_key,
    encrypt_with_shared_secret,
};
use accord_crypto::{EphemeralKeyPair, KeyPair, SessionKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::manager::SessionManager;
use crate::resolver::DidResolver;
use crate::session::{Session, SessionStatus, generate_nonce};
use crate::signing::{map_crypto_err, sign_fields, verify_fields};

/// Wire discriminator of phase 1.
pub const INVITATION_KIND: &str = "handshake_invitation";
/// Wire discriminator of phase 2.
pub const REQUEST_KIND: &str = "handshake_request";
/// Wire discriminator of phase 3.
pub const RESPONSE_KIND: &str = "handshake_response";
/// Wire discriminator of phase 4.
pub const COMPLETE_KIND: &str = "handshake_complete";

/// Literal acknowledged in phase 4 under the session key.
const SESSION_ESTABLISHED_ACK: &str = "session_established";

/// AEAD suite advertised in the phase-2 proposal.
const SHARED_PROPOSAL: &str = "chacha20poly1305";

const REQUEST_SIGNED_FIELDS: &[&str] = &[
    "kind",
    "sessionId",
    "fromDid",
    "toDid",
    "nonce",
    "ephemeralPublicKey",
    "encrypted",
    "timestamp",
];
const RESPONSE_SIGNED_FIELDS: &[&str] =
    &["kind", "sessionId", "fromDid", "toDid", "encrypted", "timestamp"];
const COMPLETE_SIGNED_FIELDS: &[&str] =
    &["kind", "sessionId", "fromDid", "toDid", "encrypted", "timestamp"];

/// Phase 1: the initiator's opening message. Unsigned — the nonce and
/// ephemeral key it carries are only trusted once echoed back under
/// the shared secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeInvitation {
    /// Always [`INVITATION_KIND`].
    pub kind: String,
    /// The initiator's DID.
    pub from_did: Did,
    /// The responder's DID.
    pub to_did: Did,
    /// Fresh nonce A.
    pub nonce: String,
    /// The initiator's ephemeral X25519 public key.
    #[serde(with = "accord_core::encoding::base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    /// Signature suites the initiator accepts.
    pub algorithms: Vec<SignatureAlgorithm>,
    /// Free-form capability labels.
    pub capabilities: Vec<String>,
    /// Initiator clock at send time.
    pub timestamp: DateTime<Utc>,
}

/// Phase 2: the responder's reply, signed by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    /// Always [`REQUEST_KIND`].
    pub kind: String,
    /// The responder-issued session id both peers converge on.
    pub session_id: String,
    /// The responder's DID.
    pub from_did: Did,
    /// The initiator's DID.
    pub to_did: Did,
    /// Fresh nonce B.
    pub nonce: String,
    /// The responder's ephemeral X25519 public key.
    #[serde(with = "accord_core::encoding::base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    /// `enc_shared{invitation nonce, request nonce, proposal}`.
    pub encrypted: SealedBox,
    /// Responder clock at send time.
    pub timestamp: DateTime<Utc>,
    /// EdDSA signature by the responder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureData>,
}

/// Phase 3: the initiator's reply, signed by the initiator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    /// Always [`RESPONSE_KIND`].
    pub kind: String,
    /// Echo of the responder-issued session id.
    pub session_id: String,
    /// The initiator's DID.
    pub from_did: Did,
    /// The responder's DID.
    pub to_did: Did,
    /// `enc_shared{request nonce, session key, expiry}`.
    pub encrypted: SealedBox,
    /// Initiator clock at send time.
    pub timestamp: DateTime<Utc>,
    /// EdDSA signature by the initiator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureData>,
}

/// Phase 4: the responder's acknowledgement, signed by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeComplete {
    /// Always [`COMPLETE_KIND`].
    pub kind: String,
    /// The agreed session id.
    pub session_id: String,
    /// The responder's DID.
    pub from_did: Did,
    /// The initiator's DID.
    pub to_did: Did,
    /// `enc_session{"session_established", metadata}`.
    pub encrypted: SealedBox,
    /// Responder clock at send time.
    pub timestamp: DateTime<Utc>,
    /// EdDSA signature by the responder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureData>,
}

/// Plaintext of the phase-2 encrypted block.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestSecret {
    invitation_nonce: String,
    request_nonce: String,
    shared_proposal: String,
}

/// Plaintext of the phase-3 encrypted block.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseSecret {
    request_nonce: String,
    session_key: SessionKey,
    expires_at: DateTime<Utc>,
}

/// Plaintext of the phase-4 encrypted block.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteSecret {
    ack: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

/// Tunables shared by both handshake drivers.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// TTL written into sessions this handshake activates.
    pub session_ttl: Duration,
    /// Maximum tolerated difference between peer and local clocks.
    pub max_clock_skew: Duration,
    /// Capability labels advertised in the invitation.
    pub capabilities: Vec<String>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(3600),
            max_clock_skew: Duration::from_secs(300),
            capabilities: vec!["messaging".to_string()],
        }
    }
}

fn check_kind(actual: &str, expected: &str) -> AccordResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::new(
            ErrorCode::ProtocolMismatch,
            format!("expected {expected} message, got {actual:?}"),
        ))
    }
}

fn check_skew(timestamp: DateTime<Utc>, max_skew: Duration) -> AccordResult<()> {
    let drift = Utc::now()
        .signed_duration_since(timestamp)
        .abs()
        .to_std()
        .unwrap_or(Duration::MAX);
    if drift > max_skew {
        return Err(Error::new(
            ErrorCode::OutOfRange,
            format!("timestamp drift {drift:?} exceeds allowed clock skew {max_skew:?}"),
        ));
    }
    Ok(())
}

fn check_addressed_to(to_did: &Did, local: &Did) -> AccordResult<()> {
    if to_did == local {
        Ok(())
    } else {
        Err(Error::new(
            ErrorCode::ProtocolMismatch,
            format!("message addressed to {to_did}, we are {local}"),
        ))
    }
}

fn check_nonce(nonce: &str) -> AccordResult<()> {
    if nonce.is_empty() {
        return Err(Error::missing_field("nonce"));
    }
    Ok(())
}

fn require_signature(signature: Option<&SignatureData>) -> AccordResult<&SignatureData> {
    signature.ok_or_else(|| Error::missing_field("signature"))
}

/// Close and evict a session after a handshake failure.
///
/// A replayed or forged message naming an already-active session must
/// not tear that session down; only in-flight handshakes are aborted.
async fn abort_session(manager: &SessionManager, id: &str) {
    if let Ok(session) = manager.get(id).await
        && session.status() == SessionStatus::Active
    {
        return;
    }
    manager.close_and_evict(id).await;
}

/// Drives the initiator (phase 1 out, phase 2 in, phase 3 out,
/// phase 4 in).
pub struct HandshakeInitiator {
    manager: Arc<SessionManager>,
    keypair: Arc<KeyPair>,
    local_did: Did,
    resolver: Arc<dyn DidResolver>,
    config: HandshakeConfig,
}

impl HandshakeInitiator {
    /// Create an initiator bound to a session manager and identity.
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        keypair: Arc<KeyPair>,
        local_did: Did,
        resolver: Arc<dyn DidResolver>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            manager,
            keypair,
            local_did,
            resolver,
            config,
        }
    }

    /// Phase 1: open a handshake toward `remote`.
    ///
    /// Creates (or reuses) the pending session, generates the
    /// ephemeral pair and nonce A, and emits the unsigned invitation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if an active session already exists for
    /// `remote` — there is nothing to negotiate.
    pub async fn initiate(&self, remote: &Did) -> AccordResult<HandshakeInvitation> {
        let mut session = self.manager.create(&self.local_did, remote).await;
        if session.is_active() {
            return Err(Error::new(
                ErrorCode::InvalidValue,
                format!("session {} with {remote} is already active", session.id),
            ));
        }

        let ephemeral = EphemeralKeyPair::generate();
        let nonce = generate_nonce();
        let ephemeral_public_key = ephemeral.public_bytes().to_vec();

        session.transition(SessionStatus::Establishing)?;
        session.local_nonce = Some(nonce.clone());
        session.set_ephemeral(ephemeral);
        self.manager.update(session.clone()).await?;

        debug!(session_id = %session.id, remote = %remote, "handshake initiated");
        Ok(HandshakeInvitation {
            kind: INVITATION_KIND.to_string(),
            from_did: self.local_did.clone(),
            to_did: remote.clone(),
            nonce,
            ephemeral_public_key,
            algorithms: vec![SignatureAlgorithm::EdDSA],
            capabilities: self.config.capabilities.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Phase 3: validate the responder's request and answer it.
    ///
    /// Verifies the responder's signature, derives the shared secret,
    /// checks the nonce echo, adopts the responder-issued session id,
    /// samples the session key, and emits the signed response.
    ///
    /// # Errors
    ///
    /// Any validation, signature, or decryption failure closes and
    /// evicts the session before the error is returned.
    pub async fn process_request(
        &self,
        request: &HandshakeRequest,
    ) -> AccordResult<HandshakeResponse> {
        match self.try_process_request(request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.abort_for(&request.from_did).await;
                Err(err)
            },
        }
    }

    async fn try_process_request(
        &self,
        request: &HandshakeRequest,
    ) -> AccordResult<HandshakeResponse> {
        check_kind(&request.kind, REQUEST_KIND)?;
        check_addressed_to(&request.to_did, &self.local_did)?;
        check_nonce(&request.nonce)?;
        check_skew(request.timestamp, self.config.max_clock_skew)?;

        let peer_key = self.resolver.resolve(&request.from_did).await?;
        let signature = require_signature(request.signature.as_ref())?;
        verify_fields(request, signature, &peer_key)?;

        let mut session = self.manager.get_by_did(&request.from_did).await?;
        if session.status() != SessionStatus::Establishing {
            return Err(Error::new(
                ErrorCode::ProtocolMismatch,
                format!("session {} is {}, not establishing", session.id, session.status()),
            ));
        }

        let ephemeral = session
            .ephemeral()
            .ok_or_else(|| Error::internal("establishing session lost its ephemeral key"))?;
        let shared = ephemeral
            .derive_shared_secret(&request.ephemeral_public_key)
            .map_err(|e| map_crypto_err(e, "deriving shared secret"))?;

        let opened = decrypt_with_shared_secret(&request.encrypted, &shared)
            .map_err(|e| map_crypto_err(e, "opening request payload"))?;
        let secret: RequestSecret = serde_json::from_slice(&opened)?;

        // Nonce echo: the encrypted block must return our invitation
        // nonce and agree with the cleartext request nonce.
        if Some(&secret.invitation_nonce) != session.local_nonce.as_ref() {
            return Err(Error::invalid_signature(
                "request does not echo the invitation nonce",
            ));
        }
        if secret.request_nonce != request.nonce {
            return Err(Error::invalid_signature(
                "encrypted request nonce disagrees with cleartext",
            ));
        }

        // Both peers converge on the responder-issued id from here on.
        let old_id = session.id.clone();
        session = self.manager.adopt_id(&old_id, &request.session_id).await?;

        let session_key = SessionKey::generate();
        let ttl = chrono::TimeDelta::from_std(self.config.session_ttl)
            .unwrap_or_else(|_| chrono::TimeDelta::seconds(3600));
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        session.remote_nonce = Some(request.nonce.clone());
        session.set_shared_secret(shared.clone());
        session.set_session_key(session_key.clone());
        session.expires_at = expires_at;
        self.manager.update(session.clone()).await?;

        let response_secret = ResponseSecret {
            request_nonce: request.nonce.clone(),
            session_key,
            expires_at,
        };
        let plaintext = serde_json::to_vec(&response_secret)?;
        let encrypted = encrypt_with_shared_secret(&plaintext, &shared)
            .map_err(|e| map_crypto_err(e, "sealing response payload"))?;

        let mut response = HandshakeResponse {
            kind: RESPONSE_KIND.to_string(),
            session_id: request.session_id.clone(),
            from_did: self.local_did.clone(),
            to_did: request.from_did.clone(),
            encrypted,
            timestamp: Utc::now(),
            signature: None,
        };
        response.signature = Some(sign_fields(
            &response,
            RESPONSE_SIGNED_FIELDS,
            &self.keypair,
            self.local_did.key_id(),
        )?);

        debug!(session_id = %response.session_id, "handshake request accepted");
        Ok(response)
    }

    /// Phase 4 (inbound): validate the responder's acknowledgement
    /// and activate the session.
    ///
    /// # Errors
    ///
    /// Any validation, signature, or decryption failure closes and
    /// evicts the session before the error is returned.
    pub async fn process_complete(&self, complete: &HandshakeComplete) -> AccordResult<Session> {
        match self.try_process_complete(complete).await {
            Ok(session) => Ok(session),
            Err(err) => {
                warn!(session_id = %complete.session_id, error = %err, "handshake aborted");
                abort_session(&self.manager, &complete.session_id).await;
                Err(err)
            },
        }
    }

    async fn try_process_complete(
        &self,
        complete: &HandshakeComplete,
    ) -> AccordResult<Session> {
        check_kind(&complete.kind, COMPLETE_KIND)?;
        check_addressed_to(&complete.to_did, &self.local_did)?;
        check_skew(complete.timestamp, self.config.max_clock_skew)?;

        let peer_key = self.resolver.resolve(&complete.from_did).await?;
        let signature = require_signature(complete.signature.as_ref())?;
        verify_fields(complete, signature, &peer_key)?;

        let mut session = self.manager.get(&complete.session_id).await?;
        if session.status() != SessionStatus::Establishing {
            return Err(Error::new(
                ErrorCode::ProtocolMismatch,
                format!("session {} is {}, not establishing", session.id, session.status()),
            ));
        }

        let session_key = session
            .session_key()
            .ok_or_else(|| Error::internal("establishing session lost its session key"))?;
        let opened = decrypt_with_session_key(&complete.encrypted, session_key)
            .map_err(|e| map_crypto_err(e, "opening completion payload"))?;
        let secret: CompleteSecret = serde_json::from_slice(&opened)?;

        if secret.ack != SESSION_ESTABLISHED_ACK {
            return Err(Error::new(
                ErrorCode::ProtocolMismatch,
                format!("unexpected completion ack {:?}", secret.ack),
            ));
        }

        session.transition(SessionStatus::Active)?;
        for (key, value) in secret.metadata {
            session.metadata.insert(key, value);
        }
        self.manager.update(session.clone()).await?;

        debug!(session_id = %session.id, "handshake complete, session active");
        Ok(session)
    }

    async fn abort_for(&self, remote: &Did) {
        if let Ok(session) = self.manager.get_by_did(remote).await
            && !session.is_active()
        {
            warn!(session_id = %session.id, "handshake aborted");
            self.manager.close_and_evict(&session.id).await;
        }
    }
}

impl std::fmt::Debug for HandshakeInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeInitiator")
            .field("local_did", &self.local_did)
            .finish_non_exhaustive()
    }
}

/// Drives the responder (phase 1 in, phase 2 out, phase 3 in,
/// phase 4 out).
pub struct HandshakeResponder {
    manager: Arc<SessionManager>,
    keypair: Arc<KeyPair>,
    local_did: Did,
    resolver: Arc<dyn DidResolver>,
    config: HandshakeConfig,
}

impl HandshakeResponder {
    /// Create a responder bound to a session manager and identity.
    #[must_use]
    pub fn new(
        manager: Arc<SessionManager>,
        keypair: Arc<KeyPair>,
        local_did: Did,
        resolver: Arc<dyn DidResolver>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            manager,
            keypair,
            local_did,
            resolver,
            config,
        }
    }

    /// Phase 2: accept an invitation and answer with a signed
    /// request.
    ///
    /// # Errors
    ///
    /// Validation failures abort the handshake; any session created
    /// for it is closed and evicted.
    pub async fn process_invitation(
        &self,
        invitation: &HandshakeInvitation,
    ) -> AccordResult<HandshakeRequest> {
        match self.try_process_invitation(invitation).await {
            Ok(request) => Ok(request),
            Err(err) => {
                if let Ok(session) = self.manager.get_by_did(&invitation.from_did).await
                    && !session.is_active()
                {
                    warn!(session_id = %session.id, error = %err, "invitation rejected");
                    self.manager.close_and_evict(&session.id).await;
                }
                Err(err)
            },
        }
    }

    async fn try_process_invitation(
        &self,
        invitation: &HandshakeInvitation,
    ) -> AccordResult<HandshakeRequest> {
        check_kind(&invitation.kind, INVITATION_KIND)?;
        check_addressed_to(&invitation.to_did, &self.local_did)?;
        check_nonce(&invitation.nonce)?;
        check_skew(invitation.timestamp, self.config.max_clock_skew)?;

        if !invitation.algorithms.contains(&SignatureAlgorithm::EdDSA) {
            return Err(Error::new(
                ErrorCode::UnsupportedProtocol,
                "peer does not accept EdDSA signatures",
            ));
        }

        let mut session = self
            .manager
            .create(&self.local_did, &invitation.from_did)
            .await;
        if session.is_active() {
            return Err(Error::new(
                ErrorCode::InvalidValue,
                format!("session with {} is already active", invitation.from_did),
            ));
        }

        let ephemeral = EphemeralKeyPair::generate();
        let shared = ephemeral
            .derive_shared_secret(&invitation.ephemeral_public_key)
            .map_err(|e| map_crypto_err(e, "deriving shared secret"))?;
        let nonce = generate_nonce();
        let ephemeral_public_key = ephemeral.public_bytes().to_vec();

        session.transition(SessionStatus::Establishing)?;
        session.local_nonce = Some(nonce.clone());
        session.remote_nonce = Some(invitation.nonce.clone());
        session.set_ephemeral(ephemeral);
        session.set_shared_secret(shared.clone());
        self.manager.update(session.clone()).await?;

        let request_secret = RequestSecret {
            invitation_nonce: invitation.nonce.clone(),
            request_nonce: nonce.clone(),
            shared_proposal: SHARED_PROPOSAL.to_string(),
        };
        let plaintext = serde_json::to_vec(&request_secret)?;
        let encrypted = encrypt_with_shared_secret(&plaintext, &shared)
            .map_err(|e| map_crypto_err(e, "sealing request payload"))?;

        let mut request = HandshakeRequest {
            kind: REQUEST_KIND.to_string(),
            session_id: session.id.clone(),
            from_did: self.local_did.clone(),
            to_did: invitation.from_did.clone(),
            nonce,
            ephemeral_public_key,
            encrypted,
            timestamp: Utc::now(),
            signature: None,
        };
        request.signature = Some(sign_fields(
            &request,
            REQUEST_SIGNED_FIELDS,
            &self.keypair,
            self.local_did.key_id(),
        )?);

        debug!(session_id = %request.session_id, "invitation accepted");
        Ok(request)
    }

    /// Phase 4 (outbound): validate the initiator's response, install
    /// the session key, activate the session, and emit the signed
    /// completion.
    ///
    /// # Errors
    ///
    /// Any validation, signature, or decryption failure closes and
    /// evicts the session before the error is returned.
    pub async fn process_response(
        &self,
        response: &HandshakeResponse,
    ) -> AccordResult<HandshakeComplete> {
        match self.try_process_response(response).await {
            Ok(complete) => Ok(complete),
            Err(err) => {
                warn!(session_id = %response.session_id, error = %err, "handshake aborted");
                abort_session(&self.manager, &response.session_id).await;
                Err(err)
            },
        }
    }

    async fn try_process_response(
        &self,
        response: &HandshakeResponse,
    ) -> AccordResult<HandshakeComplete> {
        check_kind(&response.kind, RESPONSE_KIND)?;
        check_addressed_to(&response.to_did, &self.local_did)?;
        check_skew(response.timestamp, self.config.max_clock_skew)?;

        let peer_key = self.resolver.resolve(&response.from_did).await?;
        let signature = require_signature(response.signature.as_ref())?;
        verify_fields(response, signature, &peer_key)?;

        let mut session = self.manager.get(&response.session_id).await?;
        if session.status() != SessionStatus::Establishing {
            return Err(Error::new(
                ErrorCode::ProtocolMismatch,
                format!("session {} is {}, not establishing", session.id, session.status()),
            ));
        }

        let shared = session
            .shared_secret()
            .ok_or_else(|| Error::internal("establishing session lost its shared secret"))?;
        let opened = decrypt_with_shared_secret(&response.encrypted, shared)
            .map_err(|e| map_crypto_err(e, "opening response payload"))?;
        let secret: ResponseSecret = serde_json::from_slice(&opened)?;

        // Nonce echo: the initiator must return the nonce we issued
        // in the request phase.
        if Some(&secret.request_nonce) != session.local_nonce.as_ref() {
            return Err(Error::invalid_signature(
                "response does not echo the request nonce",
            ));
        }

        session.set_session_key(secret.session_key.clone());
        session.expires_at = secret.expires_at;
        session.transition(SessionStatus::Active)?;
        self.manager.update(session.clone()).await?;

        let complete_secret = CompleteSecret {
            ack: SESSION_ESTABLISHED_ACK.to_string(),
            metadata: BTreeMap::new(),
        };
        let plaintext = serde_json::to_vec(&complete_secret)?;
        let encrypted = encrypt_with_session_key(&plaintext, &secret.session_key)
            .map_err(|e| map_crypto_err(e, "sealing completion payload"))?;

        let mut complete = HandshakeComplete {
            kind: COMPLETE_KIND.to_string(),
            session_id: response.session_id.clone(),
            from_did: self.local_did.clone(),
            to_did: response.from_did.clone(),
            encrypted,
            timestamp: Utc::now(),
            signature: None,
        };
        complete.signature = Some(sign_fields(
            &complete,
            COMPLETE_SIGNED_FIELDS,
            &self.keypair,
            self.local_did.key_id(),
        )?);

        debug!(session_id = %complete.session_id, "handshake complete, session active");
        Ok(complete)
    }
}

impl std::fmt::Debug for HandshakeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeResponder")
            .field("local_did", &self.local_did)
            .finish_non_exhaustive()
    }
}
