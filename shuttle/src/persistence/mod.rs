//! Checkpoints: snapshot of the execution point and history, sufficient
//! for resume, plus rollback with compensating tools.
//!
//! Storage providers implement [`CheckpointStorageProvider`]; the
//! [`PersistenceFeature`] intercepts node completion to write checkpoints
//! and drives rollback. A tombstone checkpoint marks a terminated session
//! that must not be resumed.

mod feature;
mod file;
mod in_memory;
mod rollback;

pub use feature::PersistenceFeature;
pub use file::FileCheckpointStorage;
pub use in_memory::InMemoryCheckpointStorage;
pub use rollback::RollbackToolRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::Message;

/// Property key marking a tombstone checkpoint.
const TOMBSTONE_PROPERTY: &str = "tombstone";

/// Errors from checkpoint storage and rollback.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("checkpoint not found: {0}")]
    NotFound(String),
    #[error("checkpoint version {found} does not match strategy version {expected}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("rollback failed: {}", .0.join("; "))]
    RollbackFailed(Vec<String>),
}

/// One checkpoint: node position, last input, message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentCheckpointData {
    pub checkpoint_id: String,
    pub created_at: DateTime<Utc>,
    pub node_id: String,
    pub last_input: Value,
    pub message_history: Vec<Message>,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl AgentCheckpointData {
    pub fn new(
        checkpoint_id: impl Into<String>,
        created_at: DateTime<Utc>,
        node_id: impl Into<String>,
        last_input: Value,
        message_history: Vec<Message>,
        version: u64,
    ) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            created_at,
            node_id: node_id.into(),
            last_input,
            message_history,
            version,
            properties: None,
        }
    }

    /// Tombstone: empty history, marker property set. Signals "do not
    /// resume" for this agent.
    pub fn tombstone(
        checkpoint_id: impl Into<String>,
        created_at: DateTime<Utc>,
        node_id: impl Into<String>,
        version: u64,
    ) -> Self {
        let mut properties = Map::new();
        properties.insert(TOMBSTONE_PROPERTY.into(), Value::Bool(true));
        Self {
            checkpoint_id: checkpoint_id.into(),
            created_at,
            node_id: node_id.into(),
            last_input: Value::Null,
            message_history: Vec::new(),
            version,
            properties: Some(properties),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.properties
            .as_ref()
            .and_then(|p| p.get(TOMBSTONE_PROPERTY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Filter for checkpoint enumeration.
#[derive(Clone, Debug, Default)]
pub struct CheckpointFilter {
    /// Only checkpoints taken at this node.
    pub node_id: Option<String>,
}

impl CheckpointFilter {
    pub fn at_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
        }
    }

    pub fn matches(&self, data: &AgentCheckpointData) -> bool {
        self.node_id
            .as_ref()
            .map_or(true, |node_id| &data.node_id == node_id)
    }
}

/// Checkpoint persistence backend. Enumeration returns checkpoints oldest
/// first; corrupt slots are skipped (never abort enumeration).
#[async_trait]
pub trait CheckpointStorageProvider: Send + Sync {
    async fn get_checkpoints(
        &self,
        agent_id: &str,
        filter: Option<&CheckpointFilter>,
    ) -> Result<Vec<AgentCheckpointData>, CheckpointError>;

    async fn save_checkpoint(
        &self,
        agent_id: &str,
        data: &AgentCheckpointData,
    ) -> Result<(), CheckpointError>;

    async fn get_latest_checkpoint(
        &self,
        agent_id: &str,
        filter: Option<&CheckpointFilter>,
    ) -> Result<Option<AgentCheckpointData>, CheckpointError> {
        Ok(self
            .get_checkpoints(agent_id, filter)
            .await?
            .into_iter()
            .last())
    }

    /// One checkpoint by id. Unlike enumeration, an explicitly requested
    /// checkpoint that cannot be read is a hard error; corruption of the
    /// checkpoint being rolled back to is never hidden.
    async fn get_checkpoint(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, CheckpointError> {
        Ok(self
            .get_checkpoints(agent_id, None)
            .await?
            .into_iter()
            .find(|c| c.checkpoint_id == checkpoint_id))
    }
}

/// How rollback restores the context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RollbackStrategy {
    /// Restore the node position and the message history.
    #[default]
    Default,
    /// Restore only the message history; the node position is untouched.
    MessageHistoryOnly,
}
