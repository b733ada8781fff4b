//! Tagged error taxonomy for Accord operations.
//!
//! Every public operation in the workspace returns [`Error`]: a code
//! plus category, a human-readable message, optional structured
//! details, and an optional wrapped cause. Callers match on
//! [`ErrorCode`], never on message text.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

/// Broad classification of an error, always derivable from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// User or peer sent malformed data.
    Validation,
    /// Wire-level incompatibility.
    Protocol,
    /// Authenticity failure.
    Security,
    /// Access denied.
    Authorization,
    /// I/O failure or a resilience primitive rejecting a call.
    Network,
    /// Resource missing in a backing store.
    Storage,
    /// Bug or configuration fault.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Protocol => "protocol",
            Self::Security => "security",
            Self::Authorization => "authz",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Stable machine-readable error codes.
///
/// Codes are the unit of matching: wrapping an error never changes
/// its code, and predicates such as [`Error::is_timeout`] are defined
/// in terms of codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // validation
    /// Input failed validation.
    InvalidInput,
    /// A required field is absent or empty.
    MissingField,
    /// A field is present but malformed.
    InvalidFormat,
    /// A field holds a value outside its allowed set.
    InvalidValue,
    /// A numeric field is outside its allowed range.
    OutOfRange,

    // protocol
    /// Message arrived over a transport that cannot carry it.
    ProtocolMismatch,
    /// No adapter is registered for the requested protocol.
    UnsupportedProtocol,
    /// Wire payload could not be parsed.
    MessageParsing,
    /// Peer speaks an incompatible protocol version.
    InvalidProtocolVersion,

    // security
    /// Signature verification failed.
    InvalidSignature,
    /// DID could not be resolved.
    DidNotFound,
    /// The identified agent is not active.
    AgentInactive,

    // authz
    /// Caller lacks permission for the operation.
    Unauthorized,
    /// Presented credentials were rejected.
    InvalidCredentials,

    // network
    /// Operation exceeded its deadline.
    Timeout,
    /// Network is unreachable.
    NetworkUnavailable,
    /// Peer refused the connection.
    ConnectionRefused,
    /// Too many requests inside the rate-limit window.
    RateLimitExceeded,
    /// Circuit breaker is open; the call was not attempted.
    CircuitBreakerOpen,
    /// Bulkhead capacity and queue are exhausted.
    BulkheadFull,
    /// Retry budget exhausted; wraps the last attempt's error.
    MaxAttemptsExceeded,
    /// The caller's context was cancelled.
    Canceled,

    // storage
    /// Resource missing in the backing store.
    NotFound,

    // internal
    /// Unexpected internal fault.
    Internal,
    /// Operation is not supported by this component.
    NotImplemented,
    /// Component was constructed with invalid configuration.
    ConfigurationError,
    /// Foreign error wrapped without a more precise code.
    WrappedError,
}

impl ErrorCode {
    /// The category this code belongs to.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::InvalidInput
            | Self::MissingField
            | Self::InvalidFormat
            | Self::InvalidValue
            | Self::OutOfRange => ErrorCategory::Validation,
            Self::ProtocolMismatch
            | Self::UnsupportedProtocol
            | Self::MessageParsing
            | Self::InvalidProtocolVersion => ErrorCategory::Protocol,
            Self::InvalidSignature | Self::DidNotFound | Self::AgentInactive => {
                ErrorCategory::Security
            },
            Self::Unauthorized | Self::InvalidCredentials => ErrorCategory::Authorization,
            Self::Timeout
            | Self::NetworkUnavailable
            | Self::ConnectionRefused
            | Self::RateLimitExceeded
            | Self::CircuitBreakerOpen
            | Self::BulkheadFull
            | Self::MaxAttemptsExceeded
            | Self::Canceled => ErrorCategory::Network,
            Self::NotFound => ErrorCategory::Storage,
            Self::Internal
            | Self::NotImplemented
            | Self::ConfigurationError
            | Self::WrappedError => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The tagged error returned by every public Accord operation.
#[derive(Debug, Clone, ThisError)]
#[error("[{category}/{code}] {message}")]
pub struct Error {
    category: ErrorCategory,
    code: ErrorCode,
    message: String,
    details: BTreeMap<String, Value>,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Create an error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category: code.category(),
            code,
            message: message.into(),
            details: BTreeMap::new(),
            cause: None,
        }
    }

    /// Attach a structured detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying cause, preserving the error chain.
    ///
    /// The code and category of `self` are unchanged; the cause is
    /// reachable through [`std::error::Error::source`].
    #[must_use]
    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Wrap a foreign error under the [`ErrorCode::WrappedError`] code.
    #[must_use]
    pub fn wrap(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorCode::WrappedError, cause.to_string()).with_cause(cause)
    }

    /// The machine-readable code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The category derived from the code.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured details attached to this error.
    #[must_use]
    pub fn details(&self) -> &BTreeMap<String, Value> {
        &self.details
    }

    /// True if this error, or any cause in its chain, carries `code`.
    #[must_use]
    pub fn matches(&self, code: ErrorCode) -> bool {
        if self.code == code {
            return true;
        }
        let mut source = self.cause.as_deref().map(|c| c as &dyn std::error::Error);
        while let Some(err) = source {
            if let Some(accord) = err.downcast_ref::<Self>()
                && accord.code == code
            {
                return true;
            }
            source = err.source();
        }
        false
    }

    /// True if the resource was missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.matches(ErrorCode::NotFound)
    }

    /// True if access was denied.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.matches(ErrorCode::Unauthorized)
    }

    /// True if the caller was rate limited.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.matches(ErrorCode::RateLimitExceeded)
    }

    /// True if a deadline elapsed.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.matches(ErrorCode::Timeout)
    }

    // Convenience constructors for the most common codes.

    /// Malformed input.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Required field absent or empty.
    #[must_use]
    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("missing required field: {field}"))
            .with_detail("field", field)
    }

    /// Resource missing.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, what)
    }

    /// Deadline elapsed.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    /// Context cancelled.
    #[must_use]
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Canceled, message)
    }

    /// Internal fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Unsupported operation.
    #[must_use]
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, what)
    }

    /// Signature failed to verify.
    #[must_use]
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSignature, message)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::MessageParsing, err.to_string()).with_cause(err)
    }
}

/// Result type carrying the Accord [`Error`].
pub type AccordResult<T> = Result<T, Error>;
