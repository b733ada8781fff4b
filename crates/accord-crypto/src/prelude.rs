//! Convenience re-exports.

pub use crate::aead::{
    SealedBox, decrypt_with_session_key, decrypt_with_shared_secret, encrypt_with_session_key,
    encrypt_with_shared_secret,
};
pub use crate::canonical::{canonical_subset, to_canonical_json};
pub use crate::{CryptoError, CryptoResult, EphemeralKeyPair, KeyPair, PublicKey, SessionKey,
    SharedSecret, Signature};
