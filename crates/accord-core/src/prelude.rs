//! Convenience re-exports for downstream crates.
//!
//! ```
//! use accord_core::prelude::*;
//!
//! let msg = Message::user_text("hello");
//! assert!(msg.validate().is_ok());
//! ```

pub use crate::context::Context;
pub use crate::did::Did;
pub use crate::error::{AccordResult, Error, ErrorCategory, ErrorCode};
pub use crate::message::{FileContent, Message, Part, Role};
pub use crate::security::{ProtocolMode, SecurityMetadata, SignatureAlgorithm, SignatureData};
pub use crate::task::{Artifact, Task, TaskState, TaskStatus};
