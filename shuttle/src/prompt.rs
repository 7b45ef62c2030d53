//! Prompt: ordered message sequence + id + request parameters.
//!
//! Prompts are value-typed and replaced atomically; message order reflects
//! conversational time. [`PromptBuilder`] appends messages in insertion
//! order and never coalesces consecutive same-role messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::message::Message;

/// Tool choice: when tools are present, controls whether the model may pick
/// (auto), must not use (none), must use (required), or must call a
/// specific tool by name.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Named(String),
}

impl std::str::FromStr for ToolChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            _ => Err(format!(
                "unknown tool_choice: {} (use auto, none, or required)",
                s
            )),
        }
    }
}

/// Request parameters for one LLM call. All fields optional; provider
/// extensions ride in `provider_specific` without touching the generic
/// contract.
///
/// Setters assert their documented ranges; violating them is a programmer
/// error, not a runtime failure.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_choices: Option<u32>,
    /// Structured-output schema, passed to the provider untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Speculative decoding hint for providers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speculation: Option<String>,
    /// End-user identifier forwarded to the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_specific: Option<BTreeMap<String, Value>>,
}

impl LlmParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sampling temperature in `[0, 2]`.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        assert!(
            (0.0..=2.0).contains(&temperature),
            "temperature must be in [0, 2], got {}",
            temperature
        );
        self.temperature = Some(temperature);
        self
    }

    /// Completion token budget, at least 1.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        assert!(max_tokens >= 1, "max_tokens must be >= 1");
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Number of alternative completions, at least 1.
    pub fn with_number_of_choices(mut self, n: u32) -> Self {
        assert!(n >= 1, "number_of_choices must be >= 1");
        self.number_of_choices = Some(n);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_provider_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.provider_specific
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Ordered message sequence with an id and request parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub messages: Vec<Message>,
    pub params: LlmParams,
}

impl Prompt {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            params: LlmParams::default(),
        }
    }

    pub fn with_params(mut self, params: LlmParams) -> Self {
        self.params = params;
        self
    }

    /// Copy with the given messages appended, in order.
    pub fn appending(&self, messages: &[Message]) -> Prompt {
        let mut next = self.clone();
        next.messages.extend_from_slice(messages);
        next
    }
}

/// Fluent builder appending messages in insertion order.
///
/// Timestamps come from the injected clock; consecutive same-role messages
/// are kept separate.
pub struct PromptBuilder {
    id: String,
    params: LlmParams,
    messages: Vec<Message>,
    clock: Arc<dyn Clock>,
}

impl PromptBuilder {
    pub fn new(id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: id.into(),
            params: LlmParams::default(),
            messages: Vec::new(),
            clock,
        }
    }

    pub fn params(mut self, params: LlmParams) -> Self {
        self.params = params;
        self
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        let now = self.clock.now();
        self.messages.push(Message::system(content, now));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        let now = self.clock.now();
        self.messages.push(Message::user(content, now));
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        let now = self.clock.now();
        self.messages.push(Message::assistant(
            content,
            crate::message::ResponseMeta::at(now),
        ));
        self
    }

    pub fn reasoning(mut self, content: impl Into<String>) -> Self {
        let now = self.clock.now();
        self.messages.push(Message::reasoning(
            content,
            crate::message::ResponseMeta::at(now),
        ));
        self
    }

    pub fn tool(mut self, name: impl Into<String>, arguments: Value) -> Self {
        let now = self.clock.now();
        self.messages.push(Message::tool_call(
            None,
            name,
            arguments,
            crate::message::ResponseMeta::at(now),
        ));
        self
    }

    pub fn tool_result(
        mut self,
        name: impl Into<String>,
        content: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        let now = self.clock.now();
        self.messages
            .push(Message::tool_result(id, name, content, now));
        self
    }

    pub fn build(self) -> Prompt {
        Prompt {
            id: self.id,
            messages: self.messages,
            params: self.params,
        }
    }
}
