//! A2A surface: task model, RW-locked task storage, and the per-session
//! validated event processor.

mod session;
mod storage;
mod task;
pub mod wire;

pub use session::{SessionError, SessionFrame, SessionProcessor, SessionSubscription};
pub use storage::{ContextTaskStorage, TaskStorage, TaskStorageError};
pub use task::{
    Artifact, SessionEvent, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};

use thiserror::Error;

/// Agent-side rejections of incoming A2A requests, before any session
/// event is produced.
#[derive(Debug, Error)]
pub enum RequestRejection {
    #[error("content type not supported: {0}")]
    ContentTypeNotSupported(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("task not cancelable: {0}")]
    TaskNotCancelable(String),
}

impl RequestRejection {
    /// Stable kind string for wire-level `ERROR` payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestRejection::ContentTypeNotSupported(_) => "ContentTypeNotSupported",
            RequestRejection::UnsupportedOperation(_) => "UnsupportedOperation",
            RequestRejection::TaskNotCancelable(_) => "TaskNotCancelable",
        }
    }
}
