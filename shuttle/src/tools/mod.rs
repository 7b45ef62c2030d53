//! Tool descriptors, the `Tool` trait, and the registry.
//!
//! A tool exposes `execute(argsJSON) -> resultJSON`; its descriptor carries
//! the name, description, and a typed parameter tree that providers turn
//! into their own schema dialects. Tools touching external resources are
//! invoked only through the shell boundary in [`shell`].

mod schema;
pub mod shell;

pub use schema::{
    descriptor_from_schema, parse_param_type, validate_args, JsonSchemaGenerator,
    ToolDescriptorSchemaGenerator, MAX_SCHEMA_DEPTH,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from registering, looking up, or calling tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not registered: {0}")]
    NotRegistered(String),
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    #[error("invalid arguments for {name}: {reason}")]
    ValidationFailed { name: String, reason: String },
    #[error("tool {name} failed: {cause}")]
    ExecutionFailed { name: String, cause: String },
}

/// Type of a single tool parameter; `List`, `Object`, and `AnyOf` nest
/// recursively up to [`MAX_SCHEMA_DEPTH`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Null,
    Enum { values: Vec<String> },
    List { item: Box<ParamType> },
    Object {
        properties: Vec<ToolParam>,
        required: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        additional_properties: Option<AdditionalProperties>,
    },
    AnyOf { types: Vec<ParamType> },
}

/// `additionalProperties` on an object schema: a plain allow/deny flag or a
/// schema for extra values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<ParamType>),
}

/// One named parameter in a tool descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub param_type: ParamType,
}

impl ToolParam {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            description: None,
            param_type,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Tool metadata handed to the LLM: name, description, and the parameter
/// tree split into required and optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required_params: Vec<ToolParam>,
    #[serde(default)]
    pub optional_params: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
        }
    }

    pub fn with_required(mut self, param: ToolParam) -> Self {
        self.required_params.push(param);
        self
    }

    pub fn with_optional(mut self, param: ToolParam) -> Self {
        self.optional_params.push(param);
        self
    }
}

/// A single callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name across a registry; used on tool-call messages.
    fn name(&self) -> &str;

    /// Descriptor handed to the LLM.
    fn descriptor(&self) -> ToolDescriptor;

    /// Runs the tool with JSON arguments, returning JSON content.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Registry mapping `name -> Tool`; duplicate names are rejected.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, used when descriptors are listed for the LLM.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool; rejects a name already present.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up and executes in one step.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotRegistered(name.to_string()))?;
        tool.execute(args).await
    }
}
