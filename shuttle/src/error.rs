//! Runtime error taxonomy.
//!
//! One top-level error for agent and strategy execution. Subsystems with
//! their own surface (A2A sessions, task storage, checkpoints, tools) carry
//! their own enums and convert into this one where a run consumes them.

use thiserror::Error;

use crate::tools::ToolError;

/// Error raised while running an agent strategy.
///
/// Every variant maps to a stable kind string (see [`RuntimeError::kind`])
/// used in pipeline event payloads and wire-level `ERROR` messages.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A node referenced a tool that is not in the registry.
    #[error("tool not registered: {0}")]
    ToolNotRegistered(String),

    /// Tool arguments violated the tool's parameter schema.
    #[error("tool validation failed: {name}: {reason}")]
    ToolValidationFailed { name: String, reason: String },

    /// The tool ran and failed.
    #[error("tool execution failed: {name}: {cause}")]
    ToolExecutionFailed { name: String, cause: String },

    /// A tool parameter schema could not be parsed or generated.
    #[error("schema generation failed: {0}")]
    SchemaGenerationFailed(String),

    /// The strategy exceeded `max_agent_iterations`.
    #[error("iteration limit exceeded: {0}")]
    IterationLimitExceeded(usize),

    /// A node produced output for which no outgoing edge fired.
    #[error("no matching edge from node: {0}")]
    NoMatchingEdge(String),

    /// Cooperative cancellation reached this operation.
    #[error("cancelled")]
    Cancelled,

    /// A deadline expired.
    #[error("timeout")]
    Timeout,

    /// LLM transport failure (provider client error, malformed response).
    #[error("llm transport: {0}")]
    LlmTransport(String),

    /// Node-local failure with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl RuntimeError {
    /// Stable kind string for event payloads and wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::ToolNotRegistered(_) => "ToolNotRegistered",
            RuntimeError::ToolValidationFailed { .. } => "ToolValidationFailed",
            RuntimeError::ToolExecutionFailed { .. } => "ToolExecutionFailed",
            RuntimeError::SchemaGenerationFailed(_) => "SchemaGenerationFailed",
            RuntimeError::IterationLimitExceeded(_) => "IterationLimitExceeded",
            RuntimeError::NoMatchingEdge(_) => "NoMatchingEdge",
            RuntimeError::Cancelled => "Cancelled",
            RuntimeError::Timeout => "Timeout",
            RuntimeError::LlmTransport(_) => "LlmTransport",
            RuntimeError::ExecutionFailed(_) => "ExecutionFailed",
        }
    }
}

impl From<ToolError> for RuntimeError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotRegistered(name) => RuntimeError::ToolNotRegistered(name),
            ToolError::DuplicateTool(name) => {
                RuntimeError::ExecutionFailed(format!("duplicate tool: {}", name))
            }
            ToolError::ValidationFailed { name, reason } => {
                RuntimeError::ToolValidationFailed { name, reason }
            }
            ToolError::ExecutionFailed { name, cause } => {
                RuntimeError::ToolExecutionFailed { name, cause }
            }
        }
    }
}
