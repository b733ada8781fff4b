//! Secure envelopes for application messages.
//!
//! Once a session is active, every application message is serialized
//! canonically, sealed under the session key, and wrapped in a
//! [`SecureEnvelope`] carrying the security block and an EdDSA
//! signature over the canonical envelope subset. Opening verifies the
//! signature first, then freshness, then decrypts.

use std::time::Duration;

use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::message::{MESSAGE_KIND, Message};
use accord_core::security::{ProtocolMode, SecurityMetadata, SignatureData};
use accord_crypto::aead::{SealedBox, decrypt_with_session_key, encrypt_with_session_key};
use accord_crypto::canonical::to_canonical_json;
use accord_crypto::{KeyPair, PublicKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Session, generate_nonce};
use crate::signing::{map_crypto_err, sign_fields, verify_fields};

/// Envelope fields covered by the signature. The security block is
/// signed with its own `signature` slot empty.
const ENVELOPE_SIGNED_FIELDS: &[&str] = &["kind", "sessionId", "payload", "security"];

/// An application message sealed for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureEnvelope {
    /// Always [`MESSAGE_KIND`].
    pub kind: String,
    /// The session this envelope belongs to.
    pub session_id: String,
    /// The AEAD-sealed message.
    pub payload: SealedBox,
    /// Mode, sender DID, nonce, timestamp, sequence, signature.
    pub security: SecurityMetadata,
}

impl SecureEnvelope {
    /// The envelope's send sequence within its session.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.security.sequence
    }
}

/// Seal `message` for the wire on an active session.
///
/// Serializes canonically, encrypts under the session key, stamps the
/// security block (fresh nonce, current time, next send sequence),
/// and signs the canonical envelope subset with the local identity
/// key. The session's send counter advances.
///
/// # Errors
///
/// - `AgentInactive` when the session is not active or holds no
///   session key
/// - validation errors from the message itself
pub fn seal_message(
    session: &mut Session,
    message: &Message,
    keypair: &KeyPair,
) -> AccordResult<SecureEnvelope> {
    message.validate()?;
    if !session.is_active() {
        return Err(Error::new(
            ErrorCode::AgentInactive,
            format!("session {} is not active", session.id),
        ));
    }
    let Some(session_key) = session.session_key().cloned() else {
        return Err(Error::new(
            ErrorCode::AgentInactive,
            format!("session {} holds no session key", session.id),
        ));
    };

    let plaintext =
        to_canonical_json(message).map_err(|e| map_crypto_err(e, "serializing message"))?;
    let payload = encrypt_with_session_key(&plaintext, &session_key)
        .map_err(|e| map_crypto_err(e, "sealing message"))?;

    let sequence = session.record_sent();
    let security = SecurityMetadata::secure(
        session.local_did.clone(),
        generate_nonce(),
        sequence,
    );

    let mut envelope = SecureEnvelope {
        kind: MESSAGE_KIND.to_string(),
        session_id: session.id.clone(),
        payload,
        security,
    };
    let signature = sign_fields(
        &envelope,
        ENVELOPE_SIGNED_FIELDS,
        keypair,
        session.local_did.key_id(),
    )?;
    envelope.security.signature = Some(signature);
    Ok(envelope)
}

/// Verify an envelope's signature without decrypting it.
///
/// # Errors
///
/// Returns `InvalidSignature` when the signature is missing or does
/// not verify against `peer_key`, and validation errors for a
/// malformed security block.
pub fn verify_envelope(envelope: &SecureEnvelope, peer_key: &PublicKey) -> AccordResult<()> {
    envelope.security.validate()?;
    if envelope.security.mode != ProtocolMode::Secure {
        return Err(Error::new(
            ErrorCode::ProtocolMismatch,
            "envelope is not in secure mode",
        ));
    }
    let Some(signature) = envelope.security.signature.clone() else {
        return Err(Error::invalid_signature("envelope carries no signature"));
    };
    let unsigned = strip_signature(envelope);
    verify_fields(&unsigned, &signature, peer_key)
}

/// Open an envelope on an active session: verify, check freshness,
/// decrypt, and count the receipt.
///
/// # Errors
///
/// - `InvalidSignature` on a missing or failing signature
/// - `ProtocolMismatch` when the envelope names another session or
///   sender
/// - `OutOfRange` when the timestamp drifts beyond `max_clock_skew`
/// - `AgentInactive` when the session is not active
pub fn open_message(
    envelope: &SecureEnvelope,
    session: &mut Session,
    peer_key: &PublicKey,
    max_clock_skew: Duration,
) -> AccordResult<Message> {
    if envelope.kind != MESSAGE_KIND {
        return Err(Error::new(
            ErrorCode::ProtocolMismatch,
            format!("expected {MESSAGE_KIND:?} envelope, got {:?}", envelope.kind),
        ));
    }
    if envelope.session_id != session.id {
        return Err(Error::new(
            ErrorCode::ProtocolMismatch,
            format!(
                "envelope names session {}, delivered on {}",
                envelope.session_id, session.id
            ),
        ));
    }
    if !session.is_active() {
        return Err(Error::new(
            ErrorCode::AgentInactive,
            format!("session {} is not active", session.id),
        ));
    }

    verify_envelope(envelope, peer_key)?;

    if envelope
        .security
        .agent_did
        .as_ref()
        .is_none_or(|did| *did != session.remote_did)
    {
        return Err(Error::new(
            ErrorCode::ProtocolMismatch,
            "envelope sender does not match the session peer",
        ));
    }
    check_freshness(envelope.security.timestamp, max_clock_skew)?;

    let Some(session_key) = session.session_key() else {
        return Err(Error::new(
            ErrorCode::AgentInactive,
            format!("session {} holds no session key", session.id),
        ));
    };
    let plaintext = decrypt_with_session_key(&envelope.payload, session_key)
        .map_err(|e| map_crypto_err(e, "opening message"))?;
    let message: Message = serde_json::from_slice(&plaintext)?;
    message.validate()?;

    session.record_received();
    Ok(message)
}

fn check_freshness(
    timestamp: Option<DateTime<Utc>>,
    max_clock_skew: Duration,
) -> AccordResult<()> {
    let Some(timestamp) = timestamp else {
        return Err(Error::missing_field("security.timestamp"));
    };
    let drift = Utc::now()
        .signed_duration_since(timestamp)
        .abs()
        .to_std()
        .unwrap_or(Duration::MAX);
    if drift > max_clock_skew {
        return Err(Error::new(
            ErrorCode::OutOfRange,
            format!("envelope drift {drift:?} exceeds allowed clock skew"),
        ));
    }
    Ok(())
}

/// The envelope with its signature slot emptied, as it looked when
/// signed.
fn strip_signature(envelope: &SecureEnvelope) -> SecureEnvelope {
    let mut unsigned = envelope.clone();
    unsigned.security.signature = None;
    unsigned
}

/// Re-attach a signature (wire decoding helper for transports that
/// carry the signature detached).
#[must_use]
pub fn with_signature(mut envelope: SecureEnvelope, signature: SignatureData) -> SecureEnvelope {
    envelope.security.signature = Some(signature);
    envelope
}
