//! Bridge from runtime messages to the `session-event` wire protocol.
//!
//! Tool-call messages become `ACTION_MULTIPLE`, tool results become
//! `OBSERVATION`/`OBSERVATIONS_MULTIPLE`, run completion becomes
//! `TERMINATION`, and runtime errors become `ERROR` with their stable kind
//! string. The envelope carries the run id, plus context/task ids on
//! task-scoped traffic.

use session_event::{Envelope, WireEvent, WireToolCall, WireToolResult};

use crate::error::RuntimeError;
use crate::message::Message;

/// Envelope for plain run traffic.
pub fn run_envelope(run_id: impl Into<String>) -> Envelope {
    Envelope::new(run_id)
}

/// Envelope for task-scoped traffic on one session.
pub fn session_envelope(
    run_id: impl Into<String>,
    context_id: impl Into<String>,
    task_id: impl Into<String>,
) -> Envelope {
    Envelope::new(run_id)
        .with_context_id(context_id)
        .with_task_id(task_id)
}

/// `ACTION_MULTIPLE` from the tool-call messages in a response; non-call
/// messages are skipped.
pub fn action_event(messages: &[Message]) -> WireEvent {
    let tool_calls = messages
        .iter()
        .filter_map(|message| match message {
            Message::ToolCall {
                id,
                tool_name,
                arguments,
                ..
            } => Some(WireToolCall {
                id: id.clone(),
                name: tool_name.clone(),
                arguments: arguments.clone(),
            }),
            _ => None,
        })
        .collect();
    WireEvent::ActionMultiple { tool_calls }
}

/// `OBSERVATION` for one result, `OBSERVATIONS_MULTIPLE` for several.
pub fn observation_event(results: &[Message]) -> WireEvent {
    let mut wire_results: Vec<WireToolResult> = results
        .iter()
        .filter_map(|message| match message {
            Message::ToolResult {
                id,
                tool_name,
                content,
                ..
            } => Some(WireToolResult {
                id: id.clone(),
                name: tool_name.clone(),
                content: content.clone(),
            }),
            _ => None,
        })
        .collect();
    if wire_results.len() == 1 {
        WireEvent::Observation {
            result: wire_results.remove(0),
        }
    } else {
        WireEvent::ObservationsMultiple {
            results: wire_results,
        }
    }
}

/// `TERMINATION` with the run's final content.
pub fn termination_event(content: Option<String>) -> WireEvent {
    WireEvent::Termination { content }
}

/// `ERROR` carrying the stable error kind and detail.
pub fn error_event(error: &RuntimeError) -> WireEvent {
    WireEvent::Error {
        kind: error.kind().to_string(),
        message: error.to_string(),
    }
}

/// `ERROR` for an agent-side request rejection.
pub fn rejection_event(rejection: &super::RequestRejection) -> WireEvent {
    WireEvent::Error {
        kind: rejection.kind().to_string(),
        message: rejection.to_string(),
    }
}
