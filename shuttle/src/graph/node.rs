//! Graph node trait: one step in a strategy.
//!
//! Receives the run context and the incoming value, returns the produced
//! value. Routing happens outside the node, on its outgoing edges.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use crate::agent::RunContext;
use crate::error::RuntimeError;
use crate::message::Message;

/// One step in a strategy graph.
///
/// Ids must be unique within a strategy; names must be unique when the
/// persistence feature is installed (checkpoints address nodes by name).
#[async_trait]
pub trait Node: Send + Sync {
    /// Node id, unique within a strategy.
    fn id(&self) -> &str;

    /// Display name; defaults to the id.
    fn name(&self) -> &str {
        self.id()
    }

    /// One step: value in, value out. Errors propagate to the strategy.
    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError>;
}

type FnNodeBody =
    dyn for<'a> Fn(&'a RunContext, Value) -> BoxFuture<'a, Result<Value, RuntimeError>>
        + Send
        + Sync;

/// Closure-backed node for small steps and tests.
pub struct FnNode {
    id: String,
    body: Arc<FnNodeBody>,
}

impl FnNode {
    pub fn new<F>(id: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a RunContext, Value) -> BoxFuture<'a, Result<Value, RuntimeError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: id.into(),
            body: Arc::new(body),
        }
    }
}

#[async_trait]
impl Node for FnNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        (self.body)(ctx, input).await
    }
}

/// Decodes a graph value produced by an LLM or tool node back into a
/// [`Message`].
pub fn message_from_value(value: &Value) -> Result<Message, RuntimeError> {
    serde_json::from_value(value.clone())
        .map_err(|e| RuntimeError::ExecutionFailed(format!("expected a message value: {}", e)))
}

/// Encodes a [`Message`] as a graph value.
pub fn message_to_value(message: &Message) -> Value {
    serde_json::to_value(message).expect("message serializes")
}
