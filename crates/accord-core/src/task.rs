//! Tasks and artifacts.
//!
//! A [`Task`] is a long-running work item produced by routing
//! messages to an agent; an [`Artifact`] is a named collection of
//! parts a task emits. The core tracks task state transitions but
//! leaves persistence to external storage backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AccordResult, Error};
use crate::message::{Message, Part};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    /// Accepted, not yet started.
    Submitted,
    /// Being worked on.
    Working,
    /// Blocked on additional input.
    InputRequired,
    /// Finished successfully.
    Completed,
    /// Canceled by the caller.
    Canceled,
    /// Finished with an error.
    Failed,
    /// Refused by the agent.
    Rejected,
}

impl TaskState {
    /// True for states a task can never leave.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time status of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Current state.
    pub state: TaskState,
    /// When the state was entered.
    pub timestamp: DateTime<Utc>,
    /// Optional agent message describing the state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl TaskStatus {
    /// A status entered now.
    #[must_use]
    pub fn now(state: TaskState) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            message: None,
        }
    }
}

/// A named collection of parts produced by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Unique artifact identifier.
    pub artifact_id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// What this artifact contains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Artifact body; at least one part.
    pub parts: Vec<Part>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Artifact {
    /// Create an artifact with the given id and parts.
    #[must_use]
    pub fn new(artifact_id: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            name: None,
            description: None,
            parts,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the artifact name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the artifact description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate the artifact.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is empty, there are no
    /// parts, or any part is invalid.
    pub fn validate(&self) -> AccordResult<()> {
        if self.artifact_id.is_empty() {
            return Err(Error::missing_field("artifactId"));
        }
        if self.parts.is_empty() {
            return Err(Error::new(
                crate::error::ErrorCode::MissingField,
                "artifact must carry at least one part",
            ));
        }
        for part in &self.parts {
            part.validate()?;
        }
        Ok(())
    }
}

/// A long-running work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Conversation this task belongs to.
    pub context_id: String,
    /// Current status.
    pub status: TaskStatus,
    /// Artifacts produced so far.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    /// Messages exchanged while working on the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a freshly submitted task.
    #[must_use]
    pub fn new(id: impl Into<String>, context_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            context_id: context_id.into(),
            status: TaskStatus {
                state: TaskState::Submitted,
                timestamp: now,
                message: None,
            },
            artifacts: Vec::new(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True once the task has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }

    /// Move the task to a new state.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when transitioning out of a terminal
    /// state.
    pub fn transition(&mut self, state: TaskState) -> AccordResult<()> {
        if self.is_terminal() {
            return Err(Error::new(
                crate::error::ErrorCode::InvalidValue,
                format!(
                    "task {} is already {} and cannot move to {state}",
                    self.id, self.status.state
                ),
            ));
        }
        self.status = TaskStatus::now(state);
        self.updated_at = self.status.timestamp;
        Ok(())
    }

    /// Record a produced artifact.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.artifacts.push(artifact);
        self.updated_at = Utc::now();
    }

    /// Append a message to the task history.
    pub fn record(&mut self, message: Message) {
        self.history.push(message);
        self.updated_at = Utc::now();
    }
}
