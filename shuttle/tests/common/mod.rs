//! Shared fixtures for integration tests: an arithmetic tool and an
//! event-recording feature.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use shuttle::pipeline::{
    AgentClosing, AgentCompleted, AgentExecutionFailed, AgentStarting, LlmCallCompleted,
    LlmCallStarting, NodeCompleted, NodeFailed, NodeStarting, StrategyCompleted, StrategyStarting,
    SubgraphCompleted, SubgraphStarting, ToolCallCompleted, ToolCallStarting,
};
use shuttle::{
    EventHandler, Feature, ParamType, Tool, ToolDescriptor, ToolError, ToolParam,
};

/// Arithmetic tool with a fixed expression table.
pub struct EvalTool;

#[async_trait]
impl Tool for EvalTool {
    fn name(&self) -> &str {
        "eval"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("eval", "Evaluates an arithmetic expression")
            .with_required(ToolParam::new("expr", ParamType::String))
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let expr = args
            .get("expr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::ValidationFailed {
                name: "eval".into(),
                reason: "missing expr".into(),
            })?;
        match expr {
            "2+2" => Ok(Value::String("4".into())),
            "3*3" => Ok(Value::String("9".into())),
            _ => Err(ToolError::ExecutionFailed {
                name: "eval".into(),
                cause: format!("cannot evaluate {}", expr),
            }),
        }
    }
}

/// Rollback tool that records each invocation's arguments.
pub struct RecordingRollbackTool {
    pub calls: Mutex<Vec<Value>>,
}

impl RecordingRollbackTool {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingRollbackTool {
    fn name(&self) -> &str {
        "undo_eval"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("undo_eval", "Compensates an eval call")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(args);
        Ok(Value::Null)
    }
}

/// Feature that records the name of every lifecycle event it sees.
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, name: impl Into<String>) {
        self.events.lock().unwrap().push(name.into());
    }
}

impl Feature for Recorder {
    fn key(&self) -> &str {
        "recorder"
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_agent_starting(&self, _: &AgentStarting) {
        self.push("AgentStarting");
    }
    async fn on_agent_completed(&self, _: &AgentCompleted) {
        self.push("AgentCompleted");
    }
    async fn on_agent_execution_failed(&self, event: &AgentExecutionFailed) {
        self.push(format!("AgentExecutionFailed({})", event.error_kind));
    }
    async fn on_agent_closing(&self, _: &AgentClosing) {
        self.push("AgentClosing");
    }
    async fn on_strategy_starting(&self, _: &StrategyStarting) {
        self.push("StrategyStarting");
    }
    async fn on_strategy_completed(&self, _: &StrategyCompleted) {
        self.push("StrategyCompleted");
    }
    async fn on_subgraph_starting(&self, event: &SubgraphStarting) {
        self.push(format!("SubgraphStarting({})", event.subgraph_name));
    }
    async fn on_subgraph_completed(&self, event: &SubgraphCompleted) {
        self.push(format!("SubgraphCompleted({})", event.subgraph_name));
    }
    async fn on_node_starting(&self, event: &NodeStarting) {
        self.push(format!("NodeExecutionStarting({})", event.node_id));
    }
    async fn on_node_completed(&self, event: &NodeCompleted) {
        self.push(format!("NodeExecutionCompleted({})", event.node_id));
    }
    async fn on_node_failed(&self, event: &NodeFailed) {
        self.push(format!("NodeExecutionFailed({})", event.node_id));
    }
    async fn on_llm_call_starting(&self, _: &LlmCallStarting) {
        self.push("LLMCallStarting");
    }
    async fn on_llm_call_completed(&self, _: &LlmCallCompleted) {
        self.push("LLMCallCompleted");
    }
    async fn on_tool_call_starting(&self, event: &ToolCallStarting) {
        self.push(format!("ToolCallStarting({})", event.tool_name));
    }
    async fn on_tool_call_completed(&self, event: &ToolCallCompleted) {
        self.push(format!("ToolCallCompleted({})", event.tool_name));
    }
}

/// True when the value is a serialized tool-call message.
pub fn is_tool_call(value: &Value) -> bool {
    value.get("role").and_then(Value::as_str) == Some("tool_call")
}

/// True when the value is a serialized assistant message.
pub fn is_assistant(value: &Value) -> bool {
    value.get("role").and_then(Value::as_str) == Some("assistant")
}
