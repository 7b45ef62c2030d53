//! Structured logging for strategy execution.

use crate::error::RuntimeError;

/// Log strategy run start.
pub fn log_run_start(strategy: &str) {
    tracing::info!(strategy = strategy, "Starting strategy run");
}

/// Log strategy run completion.
pub fn log_run_complete(strategy: &str) {
    tracing::info!(strategy = strategy, "Strategy run complete");
}

/// Log strategy run error.
pub fn log_run_error(strategy: &str, error: &RuntimeError) {
    tracing::error!(strategy = strategy, ?error, "Strategy run error");
}

/// Log node execution start.
pub fn log_node_start(node_id: &str) {
    tracing::debug!(node_id = node_id, "Starting node execution");
}

/// Log node execution completion.
pub fn log_node_complete(node_id: &str) {
    tracing::debug!(node_id = node_id, "Node execution complete");
}

/// Log node execution failure.
pub fn log_node_failed(node_id: &str, error: &RuntimeError) {
    tracing::warn!(node_id = node_id, ?error, "Node execution failed");
}
