//! File-backed checkpoint storage.
//!
//! Layout: `<root>/checkpoints/<agent_id>/<checkpoint_id>`, one JSON file
//! per checkpoint. An unparseable file yields no checkpoint at that slot
//! during enumeration (skipped with a warning) and never aborts it; an
//! explicitly requested checkpoint that cannot be parsed is a hard error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{AgentCheckpointData, CheckpointError, CheckpointFilter, CheckpointStorageProvider};

pub struct FileCheckpointStorage {
    root: PathBuf,
}

impl FileCheckpointStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn agent_dir(&self, agent_id: &str) -> PathBuf {
        self.root.join("checkpoints").join(agent_id)
    }

    async fn read_slot(path: &Path) -> Result<AgentCheckpointData, CheckpointError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CheckpointError::Storage(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::Serialization(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl CheckpointStorageProvider for FileCheckpointStorage {
    async fn get_checkpoints(
        &self,
        agent_id: &str,
        filter: Option<&CheckpointFilter>,
    ) -> Result<Vec<AgentCheckpointData>, CheckpointError> {
        let dir = self.agent_dir(agent_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CheckpointError::Storage(e.to_string())),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match Self::read_slot(&path).await {
                Ok(data) => {
                    if filter.map_or(true, |f| f.matches(&data)) {
                        checkpoints.push(data);
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable checkpoint slot");
                }
            }
        }
        checkpoints.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.checkpoint_id.cmp(&b.checkpoint_id))
        });
        Ok(checkpoints)
    }

    async fn save_checkpoint(
        &self,
        agent_id: &str,
        data: &AgentCheckpointData,
    ) -> Result<(), CheckpointError> {
        let dir = self.agent_dir(agent_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        let json = serde_json::to_vec_pretty(data)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        tokio::fs::write(dir.join(&data.checkpoint_id), json)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))
    }

    async fn get_checkpoint(
        &self,
        agent_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<AgentCheckpointData>, CheckpointError> {
        let path = self.agent_dir(agent_id).join(checkpoint_id);
        match tokio::fs::try_exists(&path).await {
            Ok(false) => Ok(None),
            Ok(true) => Self::read_slot(&path).await.map(Some),
            Err(e) => Err(CheckpointError::Storage(e.to_string())),
        }
    }
}
