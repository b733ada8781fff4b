//! Wire encoding helpers.
//!
//! Binary payloads (file bytes, signatures, ciphertext, key material
//! in transit) cross the wire base64-encoded while the core keeps
//! them as raw bytes. The serde helper modules here are referenced
//! with `#[serde(with = "...")]`; the free functions are the single
//! base64/hex codec the rest of the workspace shares.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode bytes as standard base64.
#[must_use]
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64; `None` when the input is malformed.
#[must_use]
pub fn from_base64(s: &str) -> Option<Vec<u8>> {
    STANDARD.decode(s).ok()
}

/// Encode bytes as lowercase hex.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex; `None` when the input is malformed.
#[must_use]
pub fn from_hex(s: &str) -> Option<Vec<u8>> {
    hex::decode(s).ok()
}

/// Serialize `Vec<u8>` as standard base64, deserialize from it.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Encode bytes as a base64 string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::to_base64(bytes))
    }

    /// Decode bytes from a base64 string.
    ///
    /// # Errors
    ///
    /// Fails on malformed base64.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::from_base64(&s)
            .ok_or_else(|| serde::de::Error::custom("invalid base64 payload"))
    }
}
