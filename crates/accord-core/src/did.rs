//! Decentralized identifiers.
//!
//! A [`Did`] is an opaque, registry-backed agent identifier. The core
//! never interprets the method-specific part; it only requires the
//! `did:` scheme and non-emptiness, and derives the conventional
//! verification-key id from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AccordResult, Error};

/// An agent's decentralized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Create a DID after validating its shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the value is empty or does not start
    /// with the `did:` scheme, or if nothing follows the scheme.
    pub fn new(value: impl Into<String>) -> AccordResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::missing_field("did"));
        }
        let Some(rest) = value.strip_prefix("did:") else {
            return Err(Error::new(
                crate::error::ErrorCode::InvalidFormat,
                format!("DID must use the did: scheme, got {value:?}"),
            ));
        };
        if rest.is_empty() {
            return Err(Error::new(
                crate::error::ErrorCode::InvalidFormat,
                "DID has an empty method-specific part",
            ));
        }
        Ok(Self(value))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The conventional id of this agent's first verification key.
    #[must_use]
    pub fn key_id(&self) -> String {
        format!("{}#key-1", self.0)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Did {
    type Error = Error;

    fn try_from(value: &str) -> AccordResult<Self> {
        Self::new(value)
    }
}
