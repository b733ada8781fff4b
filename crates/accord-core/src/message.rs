//! The universal unit of agent-to-agent exchange.
//!
//! A [`Message`] carries one or more [`Part`]s — text, file, or
//! structured data — plus correlation ids, free-form metadata, and an
//! optional security block. Parts form a closed set and travel with a
//! `kind` discriminator; unknown kinds are a hard decode failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AccordResult, Error, ErrorCode};
use crate::security::SecurityMetadata;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human or calling application.
    User,
    /// An agent.
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// File payload of a file part.
///
/// Either inline bytes or a URI reference. Serialization is untagged:
/// the presence of `bytes` vs `uri` discriminates on the wire, and
/// inline bytes travel base64-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContent {
    /// File content carried inline.
    #[serde(rename_all = "camelCase")]
    Bytes {
        /// File name.
        name: String,
        /// MIME type.
        mime_type: String,
        /// Raw content; base64 on the wire.
        #[serde(with = "crate::encoding::base64_bytes")]
        bytes: Vec<u8>,
    },
    /// File content referenced by URI.
    #[serde(rename_all = "camelCase")]
    Uri {
        /// File name.
        name: String,
        /// MIME type.
        mime_type: String,
        /// Location of the content.
        uri: String,
    },
}

impl FileContent {
    fn validate(&self) -> AccordResult<()> {
        match self {
            Self::Bytes { .. } => Ok(()),
            Self::Uri { uri, .. } => {
                if uri.is_empty() {
                    return Err(Error::missing_field("file.uri"));
                }
                Ok(())
            },
        }
    }
}

/// One element of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// A file, inline or by reference.
    File {
        /// The file payload.
        file: FileContent,
    },
    /// Structured data.
    Data {
        /// Free-form JSON payload.
        data: Value,
    },
}

impl Part {
    /// A text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// A file part carrying inline bytes.
    #[must_use]
    pub fn file_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::File {
            file: FileContent::Bytes {
                name: name.into(),
                mime_type: mime_type.into(),
                bytes,
            },
        }
    }

    /// A file part referencing a URI.
    #[must_use]
    pub fn file_uri(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self::File {
            file: FileContent::Uri {
                name: name.into(),
                mime_type: mime_type.into(),
                uri: uri.into(),
            },
        }
    }

    /// A structured-data part.
    #[must_use]
    pub fn data(data: Value) -> Self {
        Self::Data { data }
    }

    /// The wire discriminator of this part.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File { .. } => "file",
            Self::Data { .. } => "data",
        }
    }

    /// The text payload, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Validate this part.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a URI file part with an empty
    /// URI or a data part holding JSON null.
    pub fn validate(&self) -> AccordResult<()> {
        match self {
            Self::Text { .. } => Ok(()),
            Self::File { file } => file.validate(),
            Self::Data { data } => {
                if data.is_null() {
                    return Err(Error::new(
                        ErrorCode::InvalidValue,
                        "data part must not be null",
                    ));
                }
                Ok(())
            },
        }
    }
}

/// Wire discriminator value for messages.
pub const MESSAGE_KIND: &str = "message";

fn message_kind() -> String {
    MESSAGE_KIND.to_string()
}

/// The universal unit of exchange between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub message_id: String,
    /// Correlates messages belonging to one conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    /// Task this message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Author role.
    pub role: Role,
    /// Wire discriminator; always `"message"`.
    #[serde(default = "message_kind")]
    pub kind: String,
    /// Ordered message body; at least one part.
    pub parts: Vec<Part>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Security block, present on the secure transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityMetadata>,
}

impl Message {
    /// Create a message with the given id, role, and parts.
    #[must_use]
    pub fn new(message_id: impl Into<String>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            message_id: message_id.into(),
            context_id: None,
            task_id: None,
            role,
            kind: message_kind(),
            parts,
            metadata: BTreeMap::new(),
            security: None,
        }
    }

    /// A user message with a generated id and a single text part.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), Role::User, vec![Part::text(text)])
    }

    /// An agent reply to `incoming`: fresh id, agent role, the
    /// incoming context and task ids preserved.
    #[must_use]
    pub fn reply_to(incoming: &Self, parts: Vec<Part>) -> Self {
        Self {
            context_id: incoming.context_id.clone(),
            task_id: incoming.task_id.clone(),
            ..Self::new(Uuid::new_v4().to_string(), Role::Agent, parts)
        }
    }

    /// Set the context id.
    #[must_use]
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    /// Set the task id.
    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Append a part.
    #[must_use]
    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Insert a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a security block.
    #[must_use]
    pub fn with_security(mut self, security: SecurityMetadata) -> Self {
        self.security = Some(security);
        self
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Validate the message.
    ///
    /// Succeeds iff the id is non-empty, there is at least one part,
    /// every part validates, the `kind` discriminator is `"message"`,
    /// and any security block validates.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a validation error.
    pub fn validate(&self) -> AccordResult<()> {
        if self.message_id.is_empty() {
            return Err(Error::missing_field("messageId"));
        }
        if self.kind != MESSAGE_KIND {
            return Err(Error::new(
                ErrorCode::InvalidValue,
                format!("message kind must be {MESSAGE_KIND:?}, got {:?}", self.kind),
            ));
        }
        if self.parts.is_empty() {
            return Err(Error::new(
                ErrorCode::MissingField,
                "message must carry at least one part",
            ));
        }
        for part in &self.parts {
            part.validate()?;
        }
        if let Some(security) = &self.security {
            security.validate()?;
        }
        Ok(())
    }
}
