//! Installable features and the system-feature bootstrap.
//!
//! A feature is an event handler with a stable key. On pipeline
//! preparation the runtime reads [`FEATURES_ENV`] (or an explicit override
//! list) and installs the named features with defaults; user installations
//! always win because install is idempotent per key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    AgentClosing, AgentCompleted, AgentExecutionFailed, AgentStarting, EventHandler,
    LlmCallCompleted, LlmCallStarting, NodeCompleted, NodeFailed, NodeStarting, Pipeline,
    StrategyCompleted, StrategyStarting, ToolCallCompleted, ToolCallFailed, ToolCallStarting,
};

/// Env var listing comma-separated feature keys to auto-install.
pub const FEATURES_ENV: &str = "SHUTTLE_FEATURES";

const DEBUGGER_PORT_ENV: &str = "SHUTTLE_DEBUGGER_PORT";
const AWAIT_TIMEOUT_ENV: &str = "SHUTTLE_AWAIT_TIMEOUT_MS";

/// An installable component that subscribes to lifecycle events.
pub trait Feature: EventHandler {
    /// Stable key; one installation per key per pipeline.
    fn key(&self) -> &str;
}

/// Snapshot of process environment variables, taken once at agent
/// construction so features read a consistent view.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Empty environment for tests.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

/// Installs the system features named by `overrides` (when given) or by
/// [`FEATURES_ENV`] in the environment snapshot. Unknown keys are ignored
/// with a warning. Already-installed keys are skipped, so user
/// installations take precedence.
pub fn install_system_features(
    pipeline: &Pipeline,
    env: &Environment,
    overrides: Option<&[String]>,
) {
    let from_env: Vec<String> = env
        .get(FEATURES_ENV)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let keys: &[String] = overrides.unwrap_or(&from_env);

    for key in keys {
        match key.as_str() {
            "tracing" => {
                pipeline.install(Arc::new(TracingFeature::new()));
            }
            "debugger" => {
                pipeline.install(Arc::new(DebuggerFeature::from_environment(env)));
            }
            unknown => {
                tracing::warn!(feature = %unknown, "unknown system feature key; ignoring");
            }
        }
    }
}

/// Feature that logs every lifecycle event through `tracing`.
#[derive(Default)]
pub struct TracingFeature;

impl TracingFeature {
    pub fn new() -> Self {
        Self
    }
}

impl Feature for TracingFeature {
    fn key(&self) -> &str {
        "tracing"
    }
}

#[async_trait]
impl EventHandler for TracingFeature {
    async fn on_agent_starting(&self, event: &AgentStarting) {
        tracing::info!(agent_id = %event.agent_id, run_id = %event.run_id, strategy = %event.strategy_name, "agent starting");
    }
    async fn on_agent_completed(&self, event: &AgentCompleted) {
        tracing::info!(agent_id = %event.agent_id, run_id = %event.run_id, "agent completed");
    }
    async fn on_agent_execution_failed(&self, event: &AgentExecutionFailed) {
        tracing::error!(agent_id = %event.agent_id, run_id = %event.run_id, kind = %event.error_kind, message = %event.message, "agent failed");
    }
    async fn on_agent_closing(&self, event: &AgentClosing) {
        tracing::debug!(agent_id = %event.agent_id, run_id = %event.run_id, "agent closing");
    }
    async fn on_strategy_starting(&self, event: &StrategyStarting) {
        tracing::debug!(run_id = %event.run_id, strategy = %event.strategy_name, "strategy starting");
    }
    async fn on_strategy_completed(&self, event: &StrategyCompleted) {
        tracing::debug!(run_id = %event.run_id, strategy = %event.strategy_name, "strategy completed");
    }
    async fn on_node_starting(&self, event: &NodeStarting) {
        tracing::debug!(run_id = %event.run_id, node = %event.node_id, "node starting");
    }
    async fn on_node_completed(&self, event: &NodeCompleted) {
        tracing::debug!(run_id = %event.run_id, node = %event.node_id, "node completed");
    }
    async fn on_node_failed(&self, event: &NodeFailed) {
        tracing::warn!(run_id = %event.run_id, node = %event.node_id, kind = %event.error_kind, "node failed");
    }
    async fn on_llm_call_starting(&self, event: &LlmCallStarting) {
        tracing::debug!(run_id = %event.run_id, model = %event.model, messages = event.prompt.messages.len(), "llm call starting");
    }
    async fn on_llm_call_completed(&self, event: &LlmCallCompleted) {
        tracing::debug!(run_id = %event.run_id, model = %event.model, responses = event.responses.len(), "llm call completed");
    }
    async fn on_tool_call_starting(&self, event: &ToolCallStarting) {
        tracing::debug!(run_id = %event.run_id, tool = %event.tool_name, "tool call starting");
    }
    async fn on_tool_call_completed(&self, event: &ToolCallCompleted) {
        tracing::debug!(run_id = %event.run_id, tool = %event.tool_name, "tool call completed");
    }
    async fn on_tool_call_failed(&self, event: &ToolCallFailed) {
        tracing::warn!(run_id = %event.run_id, tool = %event.tool_name, message = %event.message, "tool call failed");
    }
}

/// Debug inspection feature: keeps a bounded trail of recent event names
/// and exposes the configured attach port.
pub struct DebuggerFeature {
    port: u16,
    await_timeout_ms: u64,
    trail: Mutex<Vec<String>>,
}

impl DebuggerFeature {
    const DEFAULT_PORT: u16 = 5005;
    const DEFAULT_AWAIT_TIMEOUT_MS: u64 = 30_000;
    const TRAIL_CAP: usize = 256;

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            await_timeout_ms: Self::DEFAULT_AWAIT_TIMEOUT_MS,
            trail: Mutex::new(Vec::new()),
        }
    }

    /// Reads port and await-timeout from the environment snapshot, falling
    /// back to defaults on missing or unparseable values.
    pub fn from_environment(env: &Environment) -> Self {
        let port = env
            .get(DEBUGGER_PORT_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_PORT);
        let await_timeout_ms = env
            .get(AWAIT_TIMEOUT_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_AWAIT_TIMEOUT_MS);
        Self {
            port,
            await_timeout_ms,
            trail: Mutex::new(Vec::new()),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn await_timeout_ms(&self) -> u64 {
        self.await_timeout_ms
    }

    /// Recent event names, oldest first.
    pub fn trail(&self) -> Vec<String> {
        self.trail.lock().unwrap().clone()
    }

    fn push(&self, name: String) {
        let mut trail = self.trail.lock().unwrap();
        if trail.len() == Self::TRAIL_CAP {
            trail.remove(0);
        }
        trail.push(name);
    }
}

impl Feature for DebuggerFeature {
    fn key(&self) -> &str {
        "debugger"
    }
}

#[async_trait]
impl EventHandler for DebuggerFeature {
    async fn on_agent_starting(&self, event: &AgentStarting) {
        self.push(format!("agent_starting:{}", event.run_id));
    }
    async fn on_node_starting(&self, event: &NodeStarting) {
        self.push(format!("node_starting:{}", event.node_id));
    }
    async fn on_node_completed(&self, event: &NodeCompleted) {
        self.push(format!("node_completed:{}", event.node_id));
    }
    async fn on_node_failed(&self, event: &NodeFailed) {
        self.push(format!("node_failed:{}", event.node_id));
    }
    async fn on_agent_completed(&self, event: &AgentCompleted) {
        self.push(format!("agent_completed:{}", event.run_id));
    }
    async fn on_agent_execution_failed(&self, event: &AgentExecutionFailed) {
        self.push(format!("agent_failed:{}", event.error_kind));
    }
}
