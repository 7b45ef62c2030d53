//! In-memory checkpoint storage. Not persistent; for dev and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AgentCheckpointData, CheckpointError, CheckpointFilter, CheckpointStorageProvider};

/// Per-agent checkpoint lists, newest last.
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    by_agent: RwLock<HashMap<String, Vec<AgentCheckpointData>>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorageProvider for InMemoryCheckpointStorage {
    async fn get_checkpoints(
        &self,
        agent_id: &str,
        filter: Option<&CheckpointFilter>,
    ) -> Result<Vec<AgentCheckpointData>, CheckpointError> {
        let guard = self.by_agent.read().await;
        Ok(guard
            .get(agent_id)
            .map(|list| {
                list.iter()
                    .filter(|data| filter.map_or(true, |f| f.matches(data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn save_checkpoint(
        &self,
        agent_id: &str,
        data: &AgentCheckpointData,
    ) -> Result<(), CheckpointError> {
        let mut guard = self.by_agent.write().await;
        guard
            .entry(agent_id.to_string())
            .or_default()
            .push(data.clone());
        Ok(())
    }
}
