//! Authenticated encryption for handshake and session payloads.
//!
//! ChaCha20-Poly1305 with a fresh random 96-bit nonce per call; the
//! nonce travels with the ciphertext. Two keyings exist:
//!
//! - the **handshake key**, expanded from the ephemeral X25519
//!   agreement, protects handshake payloads
//! - the **session key**, sampled by the initiator, protects
//!   application messages once the handshake completes

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::exchange::{SessionKey, SharedSecret};

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// An AEAD ciphertext with the nonce it was sealed under.
///
/// Both fields are base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// The 96-bit nonce sampled for this seal.
    #[serde(with = "accord_core::encoding::base64_bytes")]
    pub nonce: Vec<u8>,
    /// Ciphertext plus authentication tag.
    #[serde(with = "accord_core::encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> CryptoResult<SealedBox> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    Ok(SealedBox {
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

fn open(key: &[u8; 32], sealed: &SealedBox) -> CryptoResult<Vec<u8>> {
    if sealed.nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            actual: sealed.nonce.len(),
        });
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Encrypt a handshake payload under the ephemeral agreement.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if sealing fails.
pub fn encrypt_with_shared_secret(
    plaintext: &[u8],
    shared: &SharedSecret,
) -> CryptoResult<SealedBox> {
    seal(&shared.handshake_key()?, plaintext)
}

/// Decrypt a handshake payload sealed by the peer.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] on a bad nonce, tampered
/// ciphertext, or a mismatched agreement.
pub fn decrypt_with_shared_secret(
    sealed: &SealedBox,
    shared: &SharedSecret,
) -> CryptoResult<Vec<u8>> {
    open(&shared.handshake_key()?, sealed)
}

/// Encrypt an application payload under the session key.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptionFailed`] if sealing fails.
pub fn encrypt_with_session_key(plaintext: &[u8], key: &SessionKey) -> CryptoResult<SealedBox> {
    seal(key.as_bytes(), plaintext)
}

/// Decrypt an application payload sealed under the session key.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] on a bad nonce, tampered
/// ciphertext, or the wrong key.
pub fn decrypt_with_session_key(sealed: &SealedBox, key: &SessionKey) -> CryptoResult<Vec<u8>> {
    open(key.as_bytes(), sealed)
}
