//! Security metadata attached to messages.
//!
//! A message travelling the secure transport carries a [`SecurityMetadata`]
//! block: the protocol mode, the sender's DID, a fresh nonce, a
//! timestamp, a per-session sequence number, and the detached
//! signature over the canonical signed-fields subset.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::did::Did;
use crate::error::{AccordResult, Error, ErrorCode};

/// Which transport a message requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Unauthenticated request/response transport.
    Plain,
    /// Authenticated transport with session encryption.
    Secure,
    /// Let the selector decide per message.
    Auto,
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Secure => write!(f, "secure"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Signature suites understood on the wire.
///
/// Only EdDSA is produced by this implementation; the remaining
/// variants are accepted for interoperability with peers that present
/// secp256k1-based keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// Ed25519 signatures.
    EdDSA,
    /// ECDSA over secp256k1.
    #[serde(rename = "ECDSA-secp256k1")]
    EcdsaSecp256k1,
    /// Generic ECDSA.
    ECDSA,
    /// JOSE name for ECDSA over secp256k1.
    ES256K,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdDSA => write!(f, "EdDSA"),
            Self::EcdsaSecp256k1 => write!(f, "ECDSA-secp256k1"),
            Self::ECDSA => write!(f, "ECDSA"),
            Self::ES256K => write!(f, "ES256K"),
        }
    }
}

/// A detached signature with enough context to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureData {
    /// Signature suite.
    pub algorithm: SignatureAlgorithm,
    /// Identifier of the verification key, conventionally `<did>#key-1`.
    pub key_id: String,
    /// Raw signature bytes; base64 on the wire.
    #[serde(with = "crate::encoding::base64_bytes")]
    pub signature: Vec<u8>,
    /// Names of the fields covered by the signature, in signing order.
    pub signed_fields: Vec<String>,
}

impl SignatureData {
    /// Validate structural invariants.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key id or signature is empty,
    /// or if no signed fields are listed.
    pub fn validate(&self) -> AccordResult<()> {
        if self.key_id.is_empty() {
            return Err(Error::missing_field("keyId"));
        }
        if self.signature.is_empty() {
            return Err(Error::missing_field("signature"));
        }
        if self.signed_fields.is_empty() {
            return Err(Error::new(
                ErrorCode::MissingField,
                "signature must cover at least one field",
            ));
        }
        Ok(())
    }
}

/// Security block of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetadata {
    /// Requested protocol mode.
    pub mode: ProtocolMode,
    /// Sender's DID. Required when `mode` is [`ProtocolMode::Secure`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_did: Option<Did>,
    /// Fresh per-message nonce. Required when `mode` is secure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Sender clock at send time. Required when `mode` is secure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Per-session send sequence.
    #[serde(default)]
    pub sequence: u64,
    /// Detached signature over the canonical signed-fields subset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureData>,
}

impl SecurityMetadata {
    /// A plain-mode block with no authenticity claims.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            mode: ProtocolMode::Plain,
            agent_did: None,
            nonce: None,
            timestamp: None,
            sequence: 0,
            signature: None,
        }
    }

    /// A secure-mode block for the given sender.
    #[must_use]
    pub fn secure(agent_did: Did, nonce: impl Into<String>, sequence: u64) -> Self {
        Self {
            mode: ProtocolMode::Secure,
            agent_did: Some(agent_did),
            nonce: Some(nonce.into()),
            timestamp: Some(Utc::now()),
            sequence,
            signature: None,
        }
    }

    /// Validate the block.
    ///
    /// # Errors
    ///
    /// In secure mode, `agentDid`, `nonce`, and `timestamp` must all
    /// be present and non-empty; any attached signature must itself be
    /// structurally valid.
    pub fn validate(&self) -> AccordResult<()> {
        if self.mode == ProtocolMode::Secure {
            if self.agent_did.is_none() {
                return Err(Error::missing_field("security.agentDid"));
            }
            match &self.nonce {
                None => return Err(Error::missing_field("security.nonce")),
                Some(n) if n.is_empty() => {
                    return Err(Error::missing_field("security.nonce"));
                },
                Some(_) => {},
            }
            if self.timestamp.is_none() {
                return Err(Error::missing_field("security.timestamp"));
            }
        }
        if let Some(sig) = &self.signature {
            sig.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn did() -> Did {
        Did::new("did:example:alice").unwrap()
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&ProtocolMode::Plain).unwrap(), "\"plain\"");
        assert_eq!(serde_json::to_string(&ProtocolMode::Secure).unwrap(), "\"secure\"");
        assert_eq!(serde_json::to_string(&ProtocolMode::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn test_algorithm_wire_names() {
        assert_eq!(
            serde_json::to_string(&SignatureAlgorithm::EdDSA).unwrap(),
            "\"EdDSA\""
        );
        assert_eq!(
            serde_json::to_string(&SignatureAlgorithm::EcdsaSecp256k1).unwrap(),
            "\"ECDSA-secp256k1\""
        );
    }

    #[test]
    fn test_secure_requires_identity_fields() {
        let mut block = SecurityMetadata::secure(did(), "n-1", 0);
        assert!(block.validate().is_ok());

        block.nonce = None;
        assert!(block.validate().is_err());

        let mut block = SecurityMetadata::secure(did(), "n-1", 0);
        block.timestamp = None;
        assert!(block.validate().is_err());

        let mut block = SecurityMetadata::secure(did(), "n-1", 0);
        block.agent_did = None;
        assert!(block.validate().is_err());
    }

    #[test]
    fn test_plain_block_is_valid_without_identity() {
        assert!(SecurityMetadata::plain().validate().is_ok());
    }

    #[test]
    fn test_signature_data_validation() {
        let sig = SignatureData {
            algorithm: SignatureAlgorithm::EdDSA,
            key_id: "did:example:alice#key-1".to_string(),
            signature: vec![1, 2, 3],
            signed_fields: vec!["kind".to_string(), "payload".to_string()],
        };
        assert!(sig.validate().is_ok());

        let empty_fields = SignatureData {
            signed_fields: Vec::new(),
            ..sig.clone()
        };
        assert!(empty_fields.validate().is_err());

        let empty_sig = SignatureData {
            signature: Vec::new(),
            ..sig
        };
        assert!(empty_sig.validate().is_err());
    }

    #[test]
    fn test_camel_case_wire_shape() {
        let block = SecurityMetadata::secure(did(), "n-1", 7);
        let json = serde_json::to_value(&block).unwrap();
        assert!(json.get("agentDid").is_some());
        assert!(json.get("sequence").is_some());
        assert!(json.get("agent_did").is_none());
    }
}
