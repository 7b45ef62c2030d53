//! Library node kinds: LLM requests, tool execution, multi-choice flows,
//! and history trimming.
//!
//! These are provided as a library, not hard-wired: strategies compose them
//! with their own nodes and edges.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::RunContext;
use crate::error::RuntimeError;
use crate::llm::ChoiceSelectionStrategy;
use crate::message::Message;
use crate::pipeline::{ToolCallCompleted, ToolCallFailed, ToolCallStarting, ToolValidationFailed};
use crate::tools::validate_args;

use super::node::{message_from_value, message_to_value, Node};

/// Acquires a write session, emits one LLM call, and returns the produced
/// assistant/tool-call message (the last response when there are several).
pub struct LlmRequestNode {
    id: String,
}

impl LlmRequestNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for LlmRequestNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, _input: Value) -> Result<Value, RuntimeError> {
        let mut session = ctx.llm().write_session().await;
        let responses = session.request_llm().await?;
        Ok(responses
            .last()
            .map(message_to_value)
            .unwrap_or(Value::Null))
    }
}

/// Looks up the tool named by a tool-call message, validates the arguments,
/// invokes it, and returns the tool-result message.
pub struct ExecuteToolNode {
    id: String,
}

impl ExecuteToolNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for ExecuteToolNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let message = message_from_value(&input)?;
        let (call_id, tool_name, arguments) = match message {
            Message::ToolCall {
                id,
                tool_name,
                arguments,
                ..
            } => (id, tool_name, arguments),
            other => {
                return Err(RuntimeError::ExecutionFailed(format!(
                    "expected a tool call message, got {:?}",
                    other
                )))
            }
        };
        let pipeline = ctx.pipeline();
        let run_id = ctx.run_id().to_string();

        let tool = match ctx.tools().get(&tool_name) {
            Some(tool) => tool,
            None => {
                pipeline
                    .tool_call_failed(&ToolCallFailed {
                        run_id,
                        tool_name: tool_name.clone(),
                        arguments,
                        message: "tool not registered".into(),
                    })
                    .await;
                return Err(RuntimeError::ToolNotRegistered(tool_name));
            }
        };

        if let Err(err) = validate_args(&tool.descriptor(), &arguments) {
            let reason = err.to_string();
            pipeline
                .tool_validation_failed(&ToolValidationFailed {
                    run_id,
                    tool_name: tool_name.clone(),
                    arguments,
                    reason: reason.clone(),
                })
                .await;
            return Err(RuntimeError::ToolValidationFailed {
                name: tool_name,
                reason,
            });
        }

        pipeline
            .tool_call_starting(&ToolCallStarting {
                run_id: run_id.clone(),
                tool_name: tool_name.clone(),
                arguments: arguments.clone(),
            })
            .await;

        match tool.execute(arguments.clone()).await {
            Ok(result) => {
                pipeline
                    .tool_call_completed(&ToolCallCompleted {
                        run_id,
                        tool_name: tool_name.clone(),
                        arguments,
                        result: result.clone(),
                    })
                    .await;
                let content = match &result {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let now = ctx.llm().clock().now();
                Ok(message_to_value(&Message::tool_result(
                    call_id, tool_name, content, now,
                )))
            }
            Err(err) => {
                pipeline
                    .tool_call_failed(&ToolCallFailed {
                        run_id,
                        tool_name: tool_name.clone(),
                        arguments,
                        message: err.to_string(),
                    })
                    .await;
                Err(err.into())
            }
        }
    }
}

/// Appends incoming tool results to the prompt and issues one LLM call;
/// output is the produced message, as with [`LlmRequestNode`].
pub struct SendToolResultNode {
    id: String,
}

impl SendToolResultNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for SendToolResultNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let results: Vec<Message> = match &input {
            Value::Array(items) => items
                .iter()
                .map(message_from_value)
                .collect::<Result<_, _>>()?,
            single => vec![message_from_value(single)?],
        };
        let mut session = ctx.llm().write_session().await;
        session.append_messages(&results);
        let responses = session.request_llm().await?;
        Ok(responses
            .last()
            .map(message_to_value)
            .unwrap_or(Value::Null))
    }
}

/// Appends incoming tool results to the prompt and issues an `n`-way
/// request; output is the list of alternative response sequences.
pub struct SendResultsMultipleChoicesNode {
    id: String,
    n: u32,
}

impl SendResultsMultipleChoicesNode {
    pub fn new(id: impl Into<String>, n: u32) -> Self {
        assert!(n >= 1, "number of choices must be >= 1");
        Self { id: id.into(), n }
    }
}

#[async_trait]
impl Node for SendResultsMultipleChoicesNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let results: Vec<Message> = match &input {
            Value::Array(items) => items
                .iter()
                .map(message_from_value)
                .collect::<Result<_, _>>()?,
            single => vec![message_from_value(single)?],
        };
        let mut session = ctx.llm().write_session().await;
        session.append_messages(&results);
        let choices = session.request_llm_multiple_choices(self.n).await?;
        serde_json::to_value(&choices)
            .map_err(|e| RuntimeError::ExecutionFailed(format!("serialize choices: {}", e)))
    }
}

/// Defers to a choice selection strategy; the chosen alternative becomes
/// the canonical next message(s) on the prompt and the node's output.
pub struct SelectChoiceNode {
    id: String,
    strategy: Arc<dyn ChoiceSelectionStrategy>,
}

impl SelectChoiceNode {
    pub fn new(id: impl Into<String>, strategy: Arc<dyn ChoiceSelectionStrategy>) -> Self {
        Self {
            id: id.into(),
            strategy,
        }
    }
}

#[async_trait]
impl Node for SelectChoiceNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let choices: Vec<Vec<Message>> = serde_json::from_value(input)
            .map_err(|e| RuntimeError::ExecutionFailed(format!("expected choice list: {}", e)))?;
        let mut session = ctx.llm().write_session().await;
        let chosen = session.select_choice(self.strategy.as_ref(), choices).await?;
        serde_json::to_value(&chosen)
            .map_err(|e| RuntimeError::ExecutionFailed(format!("serialize choice: {}", e)))
    }
}

/// History trimming policy for [`TrimHistoryNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrimPolicy {
    /// Keep leading system messages plus the last `n` other messages.
    MessageCount(usize),
    /// Drop oldest non-system messages until the estimated token count
    /// fits the budget.
    TokenBudget(usize),
}

/// Applies a trim policy to the prompt in place within a write session;
/// the incoming value passes through unchanged.
pub struct TrimHistoryNode {
    id: String,
    policy: TrimPolicy,
}

impl TrimHistoryNode {
    pub fn new(id: impl Into<String>, policy: TrimPolicy) -> Self {
        Self {
            id: id.into(),
            policy,
        }
    }
}

fn estimate_tokens(message: &Message) -> usize {
    message.content().split_whitespace().count() + 4
}

pub(crate) fn trim_messages(messages: &mut Vec<Message>, policy: TrimPolicy) {
    let system_len = messages
        .iter()
        .take_while(|m| matches!(m, Message::System { .. }))
        .count();
    match policy {
        TrimPolicy::MessageCount(keep) => {
            let body_len = messages.len() - system_len;
            if body_len > keep {
                messages.drain(system_len..messages.len() - keep);
            }
        }
        TrimPolicy::TokenBudget(budget) => {
            let mut total: usize = messages.iter().map(estimate_tokens).sum();
            while total > budget && messages.len() > system_len {
                let removed = messages.remove(system_len);
                total -= estimate_tokens(&removed);
            }
        }
    }
}

#[async_trait]
impl Node for TrimHistoryNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let mut session = ctx.llm().write_session().await;
        let policy = self.policy;
        session.update_prompt(|prompt| trim_messages(&mut prompt.messages, policy));
        Ok(input)
    }
}
