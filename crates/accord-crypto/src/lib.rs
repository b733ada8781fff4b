//! Accord Crypto - Cryptographic primitives for secure agent messaging.
//!
//! This crate provides:
//! - Ed25519 identity key pairs and signatures with secure memory
//!   handling
//! - Ephemeral X25519 key agreement and the HKDF session key schedule
//! - ChaCha20-Poly1305 authenticated encryption for handshake and
//!   session payloads
//! - Canonical JSON serialization so signatures are reproducible
//!
//! # Example
//!
//! ```
//! use accord_crypto::{EphemeralKeyPair, aead};
//!
//! let alice = EphemeralKeyPair::generate();
//! let bob = EphemeralKeyPair::generate();
//!
//! let shared = alice.derive_shared_secret(&bob.public_bytes()).unwrap();
//! let sealed = aead::encrypt_with_shared_secret(b"nonce exchange", &shared).unwrap();
//!
//! let shared_b = bob.derive_shared_secret(&alice.public_bytes()).unwrap();
//! let opened = aead::decrypt_with_shared_secret(&sealed, &shared_b).unwrap();
//! assert_eq!(opened, b"nonce exchange");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod aead;
pub mod canonical;
mod error;
mod exchange;
mod keypair;
mod signature;

pub use error::{CryptoError, CryptoResult};
pub use exchange::{EphemeralKeyPair, SessionKey, SharedSecret};
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
