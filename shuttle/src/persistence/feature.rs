//! Persistence feature: automatic checkpoints after each node, tombstones
//! on terminal failure, and rollback.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::RunContext;
use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::message::Message;
use crate::pipeline::{AgentExecutionFailed, EventHandler, Feature, NodeCompleted};

use super::rollback::RollbackToolRegistry;
use super::{
    AgentCheckpointData, CheckpointError, CheckpointFilter, CheckpointStorageProvider,
    RollbackStrategy,
};

/// Intercepts node completion to write checkpoints; drives rollback.
///
/// Requires unique node names on the strategy (checkpoints address nodes
/// by id and resume jumps to them).
pub struct PersistenceFeature {
    storage: Arc<dyn CheckpointStorageProvider>,
    enable_automatic_persistence: bool,
    rollback_tools: Option<Arc<RollbackToolRegistry>>,
    rollback_strategy: RollbackStrategy,
    clock: Arc<dyn Clock>,
    /// Last node seen per run; tombstones record it as the failure point.
    last_node: Mutex<Option<String>>,
}

impl PersistenceFeature {
    pub fn new(storage: Arc<dyn CheckpointStorageProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            enable_automatic_persistence: true,
            rollback_tools: None,
            rollback_strategy: RollbackStrategy::Default,
            clock,
            last_node: Mutex::new(None),
        }
    }

    /// Toggles the after-every-node checkpoint write; manual checkpoints
    /// via [`save_checkpoint`](Self::save_checkpoint) still work when off.
    pub fn with_automatic_persistence(mut self, enabled: bool) -> Self {
        self.enable_automatic_persistence = enabled;
        self
    }

    pub fn with_rollback_tools(mut self, registry: Arc<RollbackToolRegistry>) -> Self {
        self.rollback_tools = Some(registry);
        self
    }

    pub fn with_rollback_strategy(mut self, strategy: RollbackStrategy) -> Self {
        self.rollback_strategy = strategy;
        self
    }

    pub fn storage(&self) -> &Arc<dyn CheckpointStorageProvider> {
        &self.storage
    }

    /// Writes an explicit checkpoint for the given position.
    pub async fn save_checkpoint(
        &self,
        ctx: &RunContext,
        node_id: &str,
        last_input: serde_json::Value,
        history: Vec<Message>,
    ) -> Result<AgentCheckpointData, CheckpointError> {
        let data = AgentCheckpointData::new(
            uuid::Uuid::new_v4().to_string(),
            self.clock.now(),
            node_id,
            last_input,
            history,
            ctx.strategy_version(),
        );
        self.storage.save_checkpoint(ctx.agent_id(), &data).await?;
        Ok(data)
    }

    pub async fn get_checkpoints(
        &self,
        agent_id: &str,
        filter: Option<&CheckpointFilter>,
    ) -> Result<Vec<AgentCheckpointData>, CheckpointError> {
        self.storage.get_checkpoints(agent_id, filter).await
    }

    /// Rolls the context back to the named checkpoint.
    pub async fn rollback_to_checkpoint(
        &self,
        checkpoint_id: &str,
        ctx: &RunContext,
    ) -> Result<AgentCheckpointData, CheckpointError> {
        let data = self
            .storage
            .get_checkpoint(ctx.agent_id(), checkpoint_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))?;
        self.rollback(data, ctx).await
    }

    /// Rolls the context back to the newest checkpoint.
    pub async fn rollback_to_latest_checkpoint(
        &self,
        ctx: &RunContext,
    ) -> Result<AgentCheckpointData, CheckpointError> {
        let data = self
            .storage
            .get_latest_checkpoint(ctx.agent_id(), None)
            .await?
            .ok_or_else(|| CheckpointError::NotFound("<latest>".to_string()))?;
        self.rollback(data, ctx).await
    }

    async fn rollback(
        &self,
        data: AgentCheckpointData,
        ctx: &RunContext,
    ) -> Result<AgentCheckpointData, CheckpointError> {
        if data.is_tombstone() {
            return Err(CheckpointError::Storage(format!(
                "checkpoint {} is a tombstone; session is terminated",
                data.checkpoint_id
            )));
        }
        if data.version != ctx.strategy_version() {
            return Err(CheckpointError::VersionMismatch {
                expected: ctx.strategy_version(),
                found: data.version,
            });
        }

        let mut session = ctx.llm().write_session().await;
        let current = session.prompt().messages.clone();

        // Messages past the checkpoint point get removed; their tool calls
        // are compensated in reverse order before any state changes.
        let removed: &[Message] = if current.len() > data.message_history.len() {
            &current[data.message_history.len()..]
        } else {
            &[]
        };
        if let Some(registry) = &self.rollback_tools {
            let mut failures = Vec::new();
            for message in removed.iter().rev() {
                let Message::ToolCall {
                    tool_name,
                    arguments,
                    ..
                } = message
                else {
                    continue;
                };
                let Some(rollback_tool) = registry.get(tool_name) else {
                    continue;
                };
                if let Err(err) = rollback_tool.execute(arguments.clone()).await {
                    failures.push(format!("{}: {}", tool_name, err));
                }
            }
            if !failures.is_empty() {
                return Err(CheckpointError::RollbackFailed(failures));
            }
        }

        session.update_prompt(|prompt| prompt.messages = data.message_history.clone());
        drop(session);
        if self.rollback_strategy == RollbackStrategy::Default {
            ctx.set_resume_point(data.node_id.clone(), data.last_input.clone());
        }
        Ok(data)
    }
}

impl Feature for PersistenceFeature {
    fn key(&self) -> &str {
        "persistence"
    }
}

#[async_trait]
impl EventHandler for PersistenceFeature {
    async fn on_node_completed(&self, event: &NodeCompleted) {
        *self.last_node.lock().unwrap() = Some(event.node_id.clone());
        if !self.enable_automatic_persistence {
            return;
        }
        let data = AgentCheckpointData::new(
            uuid::Uuid::new_v4().to_string(),
            self.clock.now(),
            &event.node_id,
            event.input.clone(),
            event.history.clone(),
            event.strategy_version,
        );
        if let Err(err) = self.storage.save_checkpoint(&event.agent_id, &data).await {
            tracing::warn!(agent_id = %event.agent_id, node = %event.node_id, %err, "failed to write checkpoint");
        }
    }

    async fn on_agent_execution_failed(&self, event: &AgentExecutionFailed) {
        // Cancellation is resumable; every other failure tombstones the
        // session.
        if event.error_kind == RuntimeError::Cancelled.kind() {
            return;
        }
        let node_id = self
            .last_node
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_default();
        let tombstone = AgentCheckpointData::tombstone(
            uuid::Uuid::new_v4().to_string(),
            self.clock.now(),
            node_id,
            0,
        );
        if let Err(err) = self
            .storage
            .save_checkpoint(&event.agent_id, &tombstone)
            .await
        {
            tracing::warn!(agent_id = %event.agent_id, %err, "failed to write tombstone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryCheckpointStorage;
    use chrono::DateTime;

    fn feature() -> PersistenceFeature {
        PersistenceFeature::new(
            Arc::new(InMemoryCheckpointStorage::new()),
            Arc::new(crate::clock::FixedClock::at_epoch()),
        )
    }

    /// **Scenario**: Node completion writes one checkpoint with position,
    /// input, and history.
    #[tokio::test]
    async fn node_completion_checkpoints() {
        let feature = feature();
        let epoch = DateTime::<chrono::Utc>::UNIX_EPOCH;
        feature
            .on_node_completed(&NodeCompleted {
                agent_id: "a1".into(),
                run_id: "r1".into(),
                node_id: "n2".into(),
                node_name: "n2".into(),
                input: serde_json::json!("in"),
                output: serde_json::json!("out"),
                history: vec![Message::user("hi", epoch)],
                strategy_version: 7,
            })
            .await;

        let checkpoints = feature.get_checkpoints("a1", None).await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        let data = &checkpoints[0];
        assert_eq!(data.node_id, "n2");
        assert_eq!(data.last_input, serde_json::json!("in"));
        assert_eq!(data.message_history.len(), 1);
        assert_eq!(data.version, 7);
        assert!(!data.is_tombstone());
    }

    /// **Scenario**: Terminal failures tombstone the agent; cancellation
    /// does not.
    #[tokio::test]
    async fn failure_writes_tombstone() {
        let feature = feature();
        feature
            .on_agent_execution_failed(&AgentExecutionFailed {
                agent_id: "a1".into(),
                run_id: "r1".into(),
                error_kind: "IterationLimitExceeded".into(),
                message: "limit".into(),
            })
            .await;
        let checkpoints = feature.get_checkpoints("a1", None).await.unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert!(checkpoints[0].is_tombstone());

        feature
            .on_agent_execution_failed(&AgentExecutionFailed {
                agent_id: "a2".into(),
                run_id: "r2".into(),
                error_kind: "Cancelled".into(),
                message: "cancelled".into(),
            })
            .await;
        assert!(feature.get_checkpoints("a2", None).await.unwrap().is_empty());
    }

    /// **Scenario**: Automatic persistence off means node completion writes
    /// nothing.
    #[tokio::test]
    async fn automatic_persistence_toggle() {
        let feature = feature().with_automatic_persistence(false);
        feature
            .on_node_completed(&NodeCompleted {
                agent_id: "a1".into(),
                run_id: "r1".into(),
                node_id: "n1".into(),
                node_name: "n1".into(),
                input: serde_json::Value::Null,
                output: serde_json::Value::Null,
                history: vec![],
                strategy_version: 0,
            })
            .await;
        assert!(feature.get_checkpoints("a1", None).await.unwrap().is_empty());
    }
}
