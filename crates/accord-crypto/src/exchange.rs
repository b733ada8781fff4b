//! Ephemeral key agreement and the session key schedule.
//!
//! Each handshake generates a fresh X25519 pair per side. The raw
//! Diffie-Hellman output never keys a cipher directly: it is expanded
//! through HKDF-SHA256 into the AEAD key protecting handshake
//! payloads, while the long-lived session key is sampled independently
//! from the system CSPRNG and revealed under that handshake key.

use accord_core::encoding;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Domain-separation label for the handshake key schedule.
const SHARED_KEY_INFO: &[u8] = b"accord handshake shared key v1";

/// An ephemeral X25519 key pair, generated once per handshake.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh pair from the system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Reconstruct a pair from stored secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not
    /// exactly 32 bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut secret = [0u8; 32];
        secret.copy_from_slice(bytes);
        let secret_key = StaticSecret::from(secret);
        secret.zeroize();
        let public = X25519PublicKey::from(&secret_key);
        Ok(Self {
            secret: secret_key,
            public,
        })
    }

    /// The public half, sent to the peer in the clear.
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// The secret half, for session storage between phases.
    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Derive the shared secret with the peer's ephemeral public key.
    ///
    /// Both sides derive identical bytes:
    /// `X25519(secret_self, public_peer) == X25519(secret_peer, public_self)`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the peer key is not
    /// 32 bytes.
    pub fn derive_shared_secret(&self, peer_public: &[u8]) -> CryptoResult<SharedSecret> {
        if peer_public.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: peer_public.len(),
            });
        }
        let mut peer = [0u8; 32];
        peer.copy_from_slice(peer_public);
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(peer));
        Ok(SharedSecret::from_bytes(*shared.as_bytes()))
    }
}

impl Clone for EphemeralKeyPair {
    fn clone(&self) -> Self {
        Self {
            secret: self.secret.clone(),
            public: self.public,
        }
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &encoding::to_hex(&self.public_bytes()))
            .finish_non_exhaustive()
    }
}

/// The raw X25519 agreement output (32 bytes), zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SharedSecret {}

impl SharedSecret {
    /// Wrap raw agreement bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Expand the agreement output into the handshake AEAD key.
    ///
    /// HKDF-SHA256 with a fixed info label; deterministic, so both
    /// sides reach the same key from the same agreement.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivationFailed`] if the expansion
    /// is refused. A 32-byte output is always inside HKDF-SHA256's
    /// bound, so this is unreachable in practice; the error keeps the
    /// key schedule total.
    pub fn handshake_key(&self) -> CryptoResult<[u8; 32]> {
        let hk = Hkdf::<Sha256>::new(None, &self.0);
        let mut okm = [0u8; 32];
        match hk.expand(SHARED_KEY_INFO, &mut okm) {
            Ok(()) => Ok(okm),
            Err(err) => Err(CryptoError::KeyDerivationFailed(err.to_string())),
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").finish_non_exhaustive()
    }
}

/// The symmetric key protecting application messages for one session.
///
/// Sampled fresh by the handshake initiator and revealed to the
/// responder under the handshake key. Zeroized on drop; base64 on the
/// wire (only ever inside an encrypted payload).
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SessionKey {}

impl SessionKey {
    /// Sample a fresh 32-byte key from the system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Try to create from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the slice is not
    /// exactly 32 bytes.
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        if slice.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// The raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl Serialize for SessionKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        encoding::base64_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = encoding::base64_bytes::deserialize(deserializer)?;
        Self::try_from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}
