//! Feature pipeline: typed lifecycle events fanned out to installed features.
//!
//! Each lifecycle point has a typed event value; handlers implement
//! [`EventHandler`] and override only the points they care about. Events are
//! fired synchronously in registration order from the caller's task, so
//! handlers must not block indefinitely; long work belongs on the
//! feature's own worker.

mod features;

pub use features::{
    install_system_features, DebuggerFeature, Environment, Feature, TracingFeature, FEATURES_ENV,
};

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::StreamFrame;
use crate::message::Message;
use crate::prompt::Prompt;
use crate::tools::ToolDescriptor;

/// Outcome carried on strategy/subgraph completion events.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Success { output: Value },
    Failure { kind: String, message: String },
}

/// Agent lifecycle events.
#[derive(Clone, Debug)]
pub struct AgentStarting {
    pub agent_id: String,
    pub run_id: String,
    pub strategy_name: String,
    pub input: Value,
}

#[derive(Clone, Debug)]
pub struct AgentCompleted {
    pub agent_id: String,
    pub run_id: String,
    pub output: Value,
}

#[derive(Clone, Debug)]
pub struct AgentExecutionFailed {
    pub agent_id: String,
    pub run_id: String,
    pub error_kind: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct AgentClosing {
    pub agent_id: String,
    pub run_id: String,
}

#[derive(Clone, Debug)]
pub struct EnvironmentTransforming {
    pub agent_id: String,
    pub variables: HashMap<String, String>,
}

/// Strategy lifecycle events.
#[derive(Clone, Debug)]
pub struct StrategyStarting {
    pub run_id: String,
    pub strategy_name: String,
}

#[derive(Clone, Debug)]
pub struct StrategyCompleted {
    pub run_id: String,
    pub strategy_name: String,
    pub outcome: RunOutcome,
}

/// Subgraph lifecycle events.
#[derive(Clone, Debug)]
pub struct SubgraphStarting {
    pub run_id: String,
    pub subgraph_name: String,
    pub input: Value,
}

#[derive(Clone, Debug)]
pub struct SubgraphCompleted {
    pub run_id: String,
    pub subgraph_name: String,
    pub outcome: RunOutcome,
}

#[derive(Clone, Debug)]
pub struct SubgraphFailed {
    pub run_id: String,
    pub subgraph_name: String,
    pub error_kind: String,
    pub message: String,
}

/// Node lifecycle events.
#[derive(Clone, Debug)]
pub struct NodeStarting {
    pub run_id: String,
    pub node_id: String,
    pub node_name: String,
    pub input: Value,
}

#[derive(Clone, Debug)]
pub struct NodeCompleted {
    pub agent_id: String,
    pub run_id: String,
    pub node_id: String,
    pub node_name: String,
    pub input: Value,
    pub output: Value,
    /// Prompt history at completion; consumed by the persistence feature.
    pub history: Vec<Message>,
    pub strategy_version: u64,
}

#[derive(Clone, Debug)]
pub struct NodeFailed {
    pub run_id: String,
    pub node_id: String,
    pub node_name: String,
    pub error_kind: String,
    pub message: String,
}

/// LLM call events.
#[derive(Clone, Debug)]
pub struct LlmCallStarting {
    pub run_id: String,
    pub prompt: Prompt,
    pub model: String,
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Clone, Debug)]
pub struct LlmCallCompleted {
    pub run_id: String,
    pub prompt: Prompt,
    pub model: String,
    pub responses: Vec<Message>,
}

/// LLM streaming events.
#[derive(Clone, Debug)]
pub struct LlmStreamStarting {
    pub run_id: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct LlmStreamFrameReceived {
    pub run_id: String,
    pub frame: StreamFrame,
}

#[derive(Clone, Debug)]
pub struct LlmStreamFailed {
    pub run_id: String,
    pub error_kind: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct LlmStreamCompleted {
    pub run_id: String,
    pub model: String,
}

/// Tool call events.
#[derive(Clone, Debug)]
pub struct ToolCallStarting {
    pub run_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
pub struct ToolValidationFailed {
    pub run_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub reason: String,
}

#[derive(Clone, Debug)]
pub struct ToolCallFailed {
    pub run_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct ToolCallCompleted {
    pub run_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Handler for lifecycle events. Every method defaults to a no-op;
/// features override the points they subscribe to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_agent_starting(&self, _event: &AgentStarting) {}
    async fn on_agent_completed(&self, _event: &AgentCompleted) {}
    async fn on_agent_execution_failed(&self, _event: &AgentExecutionFailed) {}
    async fn on_agent_closing(&self, _event: &AgentClosing) {}
    async fn on_environment_transforming(&self, _event: &EnvironmentTransforming) {}

    async fn on_strategy_starting(&self, _event: &StrategyStarting) {}
    async fn on_strategy_completed(&self, _event: &StrategyCompleted) {}

    async fn on_subgraph_starting(&self, _event: &SubgraphStarting) {}
    async fn on_subgraph_completed(&self, _event: &SubgraphCompleted) {}
    async fn on_subgraph_failed(&self, _event: &SubgraphFailed) {}

    async fn on_node_starting(&self, _event: &NodeStarting) {}
    async fn on_node_completed(&self, _event: &NodeCompleted) {}
    async fn on_node_failed(&self, _event: &NodeFailed) {}

    async fn on_llm_call_starting(&self, _event: &LlmCallStarting) {}
    async fn on_llm_call_completed(&self, _event: &LlmCallCompleted) {}

    async fn on_llm_stream_starting(&self, _event: &LlmStreamStarting) {}
    async fn on_llm_stream_frame(&self, _event: &LlmStreamFrameReceived) {}
    async fn on_llm_stream_failed(&self, _event: &LlmStreamFailed) {}
    async fn on_llm_stream_completed(&self, _event: &LlmStreamCompleted) {}

    async fn on_tool_call_starting(&self, _event: &ToolCallStarting) {}
    async fn on_tool_validation_failed(&self, _event: &ToolValidationFailed) {}
    async fn on_tool_call_failed(&self, _event: &ToolCallFailed) {}
    async fn on_tool_call_completed(&self, _event: &ToolCallCompleted) {}
}

struct PipelineInner {
    /// (feature key, handler) in installation order.
    handlers: Vec<(String, Arc<dyn EventHandler>)>,
    /// Typed feature slots, one per key; see [`Pipeline::feature`].
    slots: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

/// Multi-subscriber registry; fan-out is synchronous in installation order.
#[derive(Default)]
pub struct Pipeline {
    inner: RwLock<PipelineInner>,
}

impl Default for PipelineInner {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a feature. A second install of the same key is skipped with
    /// a warning and returns false (used by the system-feature bootstrap,
    /// which lets user installations win).
    pub fn install<F>(&self, feature: Arc<F>) -> bool
    where
        F: Feature + 'static,
    {
        let key = feature.key().to_string();
        let mut inner = self.inner.write().unwrap();
        if inner.slots.contains_key(&key) {
            tracing::warn!(feature = %key, "feature already installed; skipping");
            return false;
        }
        let handler: Arc<dyn EventHandler> = feature.clone();
        inner
            .slots
            .insert(key.clone(), feature as Arc<dyn Any + Send + Sync>);
        inner.handlers.push((key, handler));
        true
    }

    /// Typed access to an installed feature by key.
    pub fn feature<F>(&self, key: &str) -> Option<Arc<F>>
    where
        F: Feature + 'static,
    {
        let inner = self.inner.read().unwrap();
        inner
            .slots
            .get(key)
            .cloned()
            .and_then(|any| any.downcast::<F>().ok())
    }

    pub fn installed_keys(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.handlers.iter().map(|(k, _)| k.clone()).collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventHandler>> {
        let inner = self.inner.read().unwrap();
        inner.handlers.iter().map(|(_, h)| h.clone()).collect()
    }
}

macro_rules! fire {
    ($(#[$doc:meta])* $fn_name:ident, $handler_fn:ident, $event:ty) => {
        impl Pipeline {
            $(#[$doc])*
            pub async fn $fn_name(&self, event: &$event) {
                for handler in self.snapshot() {
                    handler.$handler_fn(event).await;
                }
            }
        }
    };
}

fire!(agent_starting, on_agent_starting, AgentStarting);
fire!(agent_completed, on_agent_completed, AgentCompleted);
fire!(
    agent_execution_failed,
    on_agent_execution_failed,
    AgentExecutionFailed
);
fire!(agent_closing, on_agent_closing, AgentClosing);
fire!(
    environment_transforming,
    on_environment_transforming,
    EnvironmentTransforming
);
fire!(strategy_starting, on_strategy_starting, StrategyStarting);
fire!(strategy_completed, on_strategy_completed, StrategyCompleted);
fire!(subgraph_starting, on_subgraph_starting, SubgraphStarting);
fire!(subgraph_completed, on_subgraph_completed, SubgraphCompleted);
fire!(subgraph_failed, on_subgraph_failed, SubgraphFailed);
fire!(node_starting, on_node_starting, NodeStarting);
fire!(node_completed, on_node_completed, NodeCompleted);
fire!(node_failed, on_node_failed, NodeFailed);
fire!(llm_call_starting, on_llm_call_starting, LlmCallStarting);
fire!(llm_call_completed, on_llm_call_completed, LlmCallCompleted);
fire!(
    llm_stream_starting,
    on_llm_stream_starting,
    LlmStreamStarting
);
fire!(
    llm_stream_frame,
    on_llm_stream_frame,
    LlmStreamFrameReceived
);
fire!(llm_stream_failed, on_llm_stream_failed, LlmStreamFailed);
fire!(
    llm_stream_completed,
    on_llm_stream_completed,
    LlmStreamCompleted
);
fire!(tool_call_starting, on_tool_call_starting, ToolCallStarting);
fire!(
    tool_validation_failed,
    on_tool_validation_failed,
    ToolValidationFailed
);
fire!(tool_call_failed, on_tool_call_failed, ToolCallFailed);
fire!(
    tool_call_completed,
    on_tool_call_completed,
    ToolCallCompleted
);
