//! Detached signatures over canonical field subsets.
//!
//! Handshake phases and secure envelopes are signed over the
//! canonical JSON of an explicit field list. The `kind` discriminator
//! is always part of that list, so a signature minted for one phase
//! cannot be replayed on another.

use accord_core::error::{AccordResult, Error, ErrorCode};
use accord_core::security::{SignatureAlgorithm, SignatureData};
use accord_crypto::canonical::canonical_subset;
use accord_crypto::{CryptoError, KeyPair, PublicKey, Signature};
use serde::Serialize;

/// Map a low-level crypto failure onto the workspace taxonomy.
pub(crate) fn map_crypto_err(err: CryptoError, what: &str) -> Error {
    let code = match &err {
        CryptoError::SignatureVerificationFailed
        | CryptoError::DecryptionFailed(_)
        | CryptoError::InvalidSignatureLength { .. } => ErrorCode::InvalidSignature,
        CryptoError::InvalidKeyLength { .. }
        | CryptoError::InvalidNonceLength { .. }
        | CryptoError::InvalidPublicKey(_)
        | CryptoError::InvalidHexEncoding
        | CryptoError::InvalidBase64Encoding => ErrorCode::InvalidFormat,
        CryptoError::SerializationFailed(_) | CryptoError::MissingSignedField(_) => {
            ErrorCode::MessageParsing
        },
        CryptoError::EncryptionFailed(_) | CryptoError::KeyDerivationFailed(_) => {
            ErrorCode::Internal
        },
    };
    Error::new(code, format!("{what}: {err}")).with_cause(err)
}

/// Sign the named fields of `payload` with the agent's identity key.
///
/// # Errors
///
/// Fails when the payload cannot be serialized or a named field is
/// absent.
pub fn sign_fields<T: Serialize>(
    payload: &T,
    fields: &[&str],
    keypair: &KeyPair,
    key_id: String,
) -> AccordResult<SignatureData> {
    let value = serde_json::to_value(payload)?;
    let bytes = canonical_subset(&value, &to_owned(fields))
        .map_err(|e| map_crypto_err(e, "signing payload"))?;
    let signature = keypair.sign(&bytes);
    Ok(SignatureData {
        algorithm: SignatureAlgorithm::EdDSA,
        key_id,
        signature: signature.to_vec(),
        signed_fields: to_owned(fields),
    })
}

/// Verify a detached signature against the canonical subset it
/// declares.
///
/// # Errors
///
/// Returns `InvalidSignature` when the signature does not verify or
/// uses an unsupported suite.
pub fn verify_fields<T: Serialize>(
    payload: &T,
    signature: &SignatureData,
    key: &PublicKey,
) -> AccordResult<()> {
    signature.validate()?;
    if signature.algorithm != SignatureAlgorithm::EdDSA {
        return Err(Error::new(
            ErrorCode::InvalidSignature,
            format!("unsupported signature algorithm {}", signature.algorithm),
        ));
    }

    let value = serde_json::to_value(payload)?;
    let bytes = canonical_subset(&value, &signature.signed_fields)
        .map_err(|e| map_crypto_err(e, "verifying payload"))?;

    let sig = Signature::try_from_slice(&signature.signature)
        .map_err(|e| map_crypto_err(e, "decoding signature"))?;
    key.verify(&bytes, &sig)
        .map_err(|e| map_crypto_err(e, "verifying signature"))
}

fn to_owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Payload {
        kind: String,
        session_id: String,
        note: String,
    }

    fn payload() -> Payload {
        Payload {
            kind: "handshake_request".to_string(),
            session_id: "s1".to_string(),
            note: "unsigned extra".to_string(),
        }
    }

    #[test]
    fn test_sign_then_verify() {
        let keypair = KeyPair::generate();
        let sig = sign_fields(
            &payload(),
            &["kind", "sessionId"],
            &keypair,
            "did:example:a#key-1".to_string(),
        )
        .unwrap();

        assert_eq!(sig.algorithm, SignatureAlgorithm::EdDSA);
        assert_eq!(sig.signed_fields, vec!["kind", "sessionId"]);
        assert!(verify_fields(&payload(), &sig, &keypair.public_key()).is_ok());
    }

    #[test]
    fn test_unsigned_field_may_change() {
        let keypair = KeyPair::generate();
        let sig = sign_fields(
            &payload(),
            &["kind", "sessionId"],
            &keypair,
            "did:example:a#key-1".to_string(),
        )
        .unwrap();

        let mut changed = payload();
        changed.note = "different".to_string();
        assert!(verify_fields(&changed, &sig, &keypair.public_key()).is_ok());
    }

    #[test]
    fn test_signed_field_change_is_detected() {
        let keypair = KeyPair::generate();
        let sig = sign_fields(
            &payload(),
            &["kind", "sessionId"],
            &keypair,
            "did:example:a#key-1".to_string(),
        )
        .unwrap();

        let mut changed = payload();
        changed.kind = "handshake_response".to_string();

        let err = verify_fields(&changed, &sig, &keypair.public_key()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSignature);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let keypair = KeyPair::generate();
        let sig = sign_fields(
            &payload(),
            &["kind"],
            &keypair,
            "did:example:a#key-1".to_string(),
        )
        .unwrap();

        let other = KeyPair::generate();
        let err = verify_fields(&payload(), &sig, &other.public_key()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSignature);
    }
}
