//! Task model: state machine, status, artifacts, and the session events
//! that mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;

/// Task lifecycle state. `Submitted → Working → (InputRequired ↔ Working)*`
/// ends in one of the four terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
}

impl TaskState {
    /// Terminal states accept no further updates.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Canceled | TaskState::Failed | TaskState::Rejected
        )
    }
}

/// Current status of a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    pub timestamp: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(state: TaskState, timestamp: DateTime<Utc>) -> Self {
        Self {
            state,
            message: None,
            timestamp,
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }
}

/// Output artifact attached to a task; delta updates append parts or
/// replace the artifact wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub parts: Vec<Value>,
}

/// A task: id, owning context, status, optional history/artifacts/metadata.
/// The `context_id` is immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            status,
            history: None,
            artifacts: None,
            metadata: None,
        }
    }
}

/// Status delta for an existing task; `final_` closes the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final")]
    pub final_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Artifact delta for an existing task; `append` concatenates parts onto a
/// same-id artifact instead of replacing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskArtifactUpdateEvent {
    pub task_id: String,
    pub context_id: String,
    pub artifact: Artifact,
    #[serde(default)]
    pub append: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// One event on a session: a plain message, or a task delta that writes
/// through to storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Message {
        context_id: String,
        message: Message,
    },
    Task(Task),
    StatusUpdate(TaskStatusUpdateEvent),
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl SessionEvent {
    pub fn context_id(&self) -> &str {
        match self {
            SessionEvent::Message { context_id, .. } => context_id,
            SessionEvent::Task(task) => &task.context_id,
            SessionEvent::StatusUpdate(event) => &event.context_id,
            SessionEvent::ArtifactUpdate(event) => &event.context_id,
        }
    }

    /// Task id for task events; None for message events.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            SessionEvent::Message { .. } => None,
            SessionEvent::Task(task) => Some(&task.id),
            SessionEvent::StatusUpdate(event) => Some(&event.task_id),
            SessionEvent::ArtifactUpdate(event) => Some(&event.task_id),
        }
    }

    pub fn is_task_event(&self) -> bool {
        self.task_id().is_some()
    }
}
