//! Wire-level event types: `type` discriminator + payload.
//!
//! Five message kinds cross the session bus: tool calls to the environment
//! (`ACTION_MULTIPLE`), tool results back (`OBSERVATION` /
//! `OBSERVATIONS_MULTIPLE`), end of the exchange (`TERMINATION`) and
//! transport-level failures (`ERROR`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::envelope::Envelope;

/// One tool invocation requested from the environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Provider-assigned call id; echoed back on the matching result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

/// One tool result produced by the environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub content: String,
}

/// Wire event: one message on the session bus (`type` + payload).
///
/// The envelope (`run_id`, and `context_id`/`task_id` on task-scoped
/// traffic) is applied separately; see [`Envelope`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireEvent {
    /// Tool calls for the environment to execute.
    ActionMultiple { tool_calls: Vec<WireToolCall> },
    /// A single tool result.
    Observation { result: WireToolResult },
    /// A batch of tool results, in call order.
    ObservationsMultiple { results: Vec<WireToolResult> },
    /// The exchange is over; optional final content.
    Termination {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    /// Transport-level failure with a stable kind string.
    Error { kind: String, message: String },
}

impl WireEvent {
    /// Serializes this event to a JSON object (type + payload, no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Transport/envelope violations (stable kinds for the error taxonomy).
#[derive(Debug, Error)]
pub enum WireError {
    /// The line was not valid JSON or did not match any known shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    /// Valid JSON, but an event type this endpoint does not accept.
    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(String),
    /// The peer identified itself as a server we did not connect to.
    #[error("unexpected server: {0}")]
    UnexpectedServer(String),
}

/// Parses one wire line into `(envelope, event)`.
///
/// The envelope fields (`run_id`, `context_id`, `task_id`) live at the top
/// level beside `type`; both are decoded from the same object.
pub fn parse_envelope(line: &str) -> Result<(Envelope, WireEvent), WireError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| WireError::MalformedMessage(e.to_string()))?;
    let ty = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| WireError::MalformedMessage("missing type".into()))?
        .to_string();
    let envelope: Envelope = serde_json::from_value(value.clone())
        .map_err(|e| WireError::MalformedMessage(e.to_string()))?;
    let event: WireEvent =
        serde_json::from_value(value).map_err(|_| WireError::UnexpectedMessageType(ty))?;
    Ok((envelope, event))
}
