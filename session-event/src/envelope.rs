//! Envelope: `run_id` on every message; `context_id`/`task_id` on task traffic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::WireEvent;

/// Envelope fields carried beside `type` on each wire message.
///
/// `run_id` is constant within a run. `context_id` and `task_id` are set on
/// task-scoped events only and absent on plain message traffic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl Envelope {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            context_id: None,
            task_id: None,
        }
    }

    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = Some(id.into());
        self
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    /// Merges envelope fields into the given JSON object (top-level only).
    /// Does not overwrite existing keys.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        obj.entry("run_id")
            .or_insert_with(|| Value::String(self.run_id.clone()));
        if let Some(ref id) = self.context_id {
            obj.entry("context_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.task_id {
            obj.entry("task_id")
                .or_insert_with(|| Value::String(id.clone()));
        }
    }
}

/// Converts a wire event to JSON with the envelope applied.
pub fn to_json(envelope: &Envelope, event: &WireEvent) -> Result<Value, serde_json::Error> {
    let mut value = event.to_value()?;
    envelope.inject_into(&mut value);
    Ok(value)
}
