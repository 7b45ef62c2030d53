//! In-memory task storage behind a readers–writer lock.
//!
//! Readers are concurrent; writers are exclusive. Status and artifact
//! events apply as deltas; a context index backs `get_by_context`. Once a
//! task reaches a terminal state every further update targeting it fails.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use super::task::{Artifact, SessionEvent, Task, TaskArtifactUpdateEvent, TaskStatusUpdateEvent};

/// Errors surfaced by task storage operations.
#[derive(Debug, Error)]
pub enum TaskStorageError {
    #[error("task operation failed: {id}: {reason}")]
    TaskOperationFailed { id: String, reason: String },
    #[error("history length must be non-negative, got {0}")]
    NegativeHistoryLength(i64),
}

impl TaskStorageError {
    fn failed(id: &str, reason: impl Into<String>) -> Self {
        Self::TaskOperationFailed {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<String, Task>,
    by_context: HashMap<String, HashSet<String>>,
}

/// RW-locked in-memory task store.
#[derive(Default)]
pub struct TaskStorage {
    inner: RwLock<StoreInner>,
}

impl TaskStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one task. `history_length`: `None` keeps the full history,
    /// `Some(n)` keeps the last `n` messages; negative values are rejected.
    /// Artifacts are stripped unless requested.
    pub async fn get(
        &self,
        task_id: &str,
        history_length: Option<i64>,
        include_artifacts: bool,
    ) -> Result<Option<Task>, TaskStorageError> {
        let window = validate_history_length(history_length)?;
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .get(task_id)
            .map(|task| shape_task(task, window, include_artifacts)))
    }

    /// Best-effort read of several tasks; missing ids are skipped.
    pub async fn get_all(
        &self,
        task_ids: &[String],
        history_length: Option<i64>,
        include_artifacts: bool,
    ) -> Result<Vec<Task>, TaskStorageError> {
        let window = validate_history_length(history_length)?;
        let inner = self.inner.read().await;
        Ok(task_ids
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .map(|task| shape_task(task, window, include_artifacts))
            .collect())
    }

    /// All tasks of a context, via the context index.
    pub async fn get_by_context(
        &self,
        context_id: &str,
        history_length: Option<i64>,
        include_artifacts: bool,
    ) -> Result<Vec<Task>, TaskStorageError> {
        let window = validate_history_length(history_length)?;
        let inner = self.inner.read().await;
        let Some(ids) = inner.by_context.get(context_id) else {
            return Ok(Vec::new());
        };
        let mut tasks: Vec<Task> = ids
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .map(|task| shape_task(task, window, include_artifacts))
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Applies a task event and returns the resulting task.
    pub async fn update(&self, event: &SessionEvent) -> Result<Task, TaskStorageError> {
        let mut inner = self.inner.write().await;
        match event {
            SessionEvent::Message { .. } => Err(TaskStorageError::failed(
                "-",
                "message events are not stored",
            )),
            SessionEvent::Task(task) => apply_task(&mut inner, task),
            SessionEvent::StatusUpdate(update) => apply_status(&mut inner, update),
            SessionEvent::ArtifactUpdate(update) => apply_artifact(&mut inner, update),
        }
    }

    /// Removes a task and its context index entry.
    pub async fn delete(&self, task_id: &str) -> Result<(), TaskStorageError> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .remove(task_id)
            .ok_or_else(|| TaskStorageError::failed(task_id, "task not found"))?;
        unindex(&mut inner, &task.context_id, task_id);
        Ok(())
    }

    /// Best-effort bulk delete; missing ids are ignored.
    pub async fn delete_all(&self, task_ids: &[String]) -> Result<(), TaskStorageError> {
        let mut inner = self.inner.write().await;
        for task_id in task_ids {
            if let Some(task) = inner.tasks.remove(task_id) {
                unindex(&mut inner, &task.context_id, task_id);
            }
        }
        Ok(())
    }
}

fn validate_history_length(history_length: Option<i64>) -> Result<Option<usize>, TaskStorageError> {
    match history_length {
        None => Ok(None),
        Some(n) if n < 0 => Err(TaskStorageError::NegativeHistoryLength(n)),
        Some(n) => Ok(Some(n as usize)),
    }
}

fn shape_task(task: &Task, history_length: Option<usize>, include_artifacts: bool) -> Task {
    let mut shaped = task.clone();
    if let Some(n) = history_length {
        if let Some(history) = shaped.history.as_mut() {
            if history.len() > n {
                history.drain(..history.len() - n);
            }
        }
    }
    if !include_artifacts {
        shaped.artifacts = None;
    }
    shaped
}

fn ensure_not_terminal(existing: &Task) -> Result<(), TaskStorageError> {
    if existing.status.state.is_terminal() {
        return Err(TaskStorageError::failed(
            &existing.id,
            format!("task is in terminal state {:?}", existing.status.state),
        ));
    }
    Ok(())
}

/// Shallow union; event metadata wins on key conflicts.
fn merge_metadata(
    current: &mut Option<serde_json::Map<String, serde_json::Value>>,
    incoming: &Option<serde_json::Map<String, serde_json::Value>>,
) {
    if let Some(incoming) = incoming {
        let target = current.get_or_insert_with(serde_json::Map::new);
        for (key, value) in incoming {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn apply_task(inner: &mut StoreInner, task: &Task) -> Result<Task, TaskStorageError> {
    if let Some(existing) = inner.tasks.get(&task.id) {
        if existing.context_id != task.context_id {
            return Err(TaskStorageError::failed(&task.id, "Cannot change context"));
        }
        ensure_not_terminal(existing)?;
    }
    inner
        .by_context
        .entry(task.context_id.clone())
        .or_default()
        .insert(task.id.clone());
    inner.tasks.insert(task.id.clone(), task.clone());
    Ok(task.clone())
}

fn apply_status(
    inner: &mut StoreInner,
    update: &TaskStatusUpdateEvent,
) -> Result<Task, TaskStorageError> {
    let task = inner
        .tasks
        .get_mut(&update.task_id)
        .ok_or_else(|| TaskStorageError::failed(&update.task_id, "task not found"))?;
    ensure_not_terminal(task)?;
    // The previous status message moves into history before the new status
    // takes its place.
    if let Some(previous) = task.status.message.take() {
        task.history.get_or_insert_with(Vec::new).push(previous);
    }
    task.status = update.status.clone();
    merge_metadata(&mut task.metadata, &update.metadata);
    Ok(task.clone())
}

fn apply_artifact(
    inner: &mut StoreInner,
    update: &TaskArtifactUpdateEvent,
) -> Result<Task, TaskStorageError> {
    let task = inner
        .tasks
        .get_mut(&update.task_id)
        .ok_or_else(|| TaskStorageError::failed(&update.task_id, "task not found"))?;
    ensure_not_terminal(task)?;
    let artifacts = task.artifacts.get_or_insert_with(Vec::new);
    match artifacts
        .iter_mut()
        .find(|a| a.artifact_id == update.artifact.artifact_id)
    {
        Some(existing) if update.append => {
            existing.parts.extend(update.artifact.parts.iter().cloned());
        }
        Some(existing) => {
            *existing = update.artifact.clone();
        }
        None => artifacts.push(update.artifact.clone()),
    }
    merge_metadata(&mut task.metadata, &update.metadata);
    Ok(task.clone())
}

fn unindex(inner: &mut StoreInner, context_id: &str, task_id: &str) {
    if let Some(ids) = inner.by_context.get_mut(context_id) {
        ids.remove(task_id);
        if ids.is_empty() {
            inner.by_context.remove(context_id);
        }
    }
}

/// Wrapper scoping a storage to one context; cross-context deletes are
/// rejected.
pub struct ContextTaskStorage {
    context_id: String,
    inner: Arc<TaskStorage>,
}

impl ContextTaskStorage {
    pub fn new(context_id: impl Into<String>, inner: Arc<TaskStorage>) -> Self {
        Self {
            context_id: context_id.into(),
            inner,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub async fn get(
        &self,
        task_id: &str,
        history_length: Option<i64>,
        include_artifacts: bool,
    ) -> Result<Option<Task>, TaskStorageError> {
        self.inner
            .get(task_id, history_length, include_artifacts)
            .await
    }

    pub async fn get_tasks(
        &self,
        history_length: Option<i64>,
        include_artifacts: bool,
    ) -> Result<Vec<Task>, TaskStorageError> {
        self.inner
            .get_by_context(&self.context_id, history_length, include_artifacts)
            .await
    }

    /// Deletes only when the task belongs to this context.
    pub async fn delete(&self, task_id: &str) -> Result<(), TaskStorageError> {
        let task = self
            .inner
            .get(task_id, Some(0), false)
            .await?
            .ok_or_else(|| TaskStorageError::failed(task_id, "task not found"))?;
        if task.context_id != self.context_id {
            return Err(TaskStorageError::failed(
                task_id,
                "Cannot delete task from another context",
            ));
        }
        self.inner.delete(task_id).await
    }
}
