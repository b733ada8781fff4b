//! Accord Core - Foundation types for the Accord agent messaging kit.
//!
//! This crate provides:
//! - The [`Message`]/[`Part`]/[`Artifact`]/[`Task`] value types and
//!   their wire serialization
//! - DID identifiers and message security metadata
//! - The unified tagged [`Error`] taxonomy
//! - The request [`Context`] threaded through the routing pipeline

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod context;
pub mod did;
pub mod encoding;
pub mod error;
pub mod message;
pub mod security;
pub mod task;

pub use context::Context;
pub use did::Did;
pub use error::{AccordResult, Error, ErrorCategory, ErrorCode};
pub use message::{FileContent, Message, Part, Role, MESSAGE_KIND};
pub use security::{ProtocolMode, SecurityMetadata, SignatureAlgorithm, SignatureData};
pub use task::{Artifact, Task, TaskState, TaskStatus};
