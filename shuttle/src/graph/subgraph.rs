//! Subgraph node: a node whose execution runs an inner strategy.
//!
//! The inner strategy runs with the enclosing run context (shared LLM
//! context, storage, and iteration counter) but fires its own nested
//! pipeline events. Inner failures propagate as this node's failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::RunContext;
use crate::error::RuntimeError;
use crate::pipeline::{RunOutcome, SubgraphCompleted, SubgraphFailed, SubgraphStarting};

use super::executor::run_strategy_from;
use super::node::Node;
use super::strategy::Strategy;
use super::START;

/// Runs an inner strategy as one node of the enclosing graph.
pub struct SubgraphNode {
    id: String,
    inner: Arc<Strategy>,
}

impl SubgraphNode {
    pub fn new(id: impl Into<String>, inner: Arc<Strategy>) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.inner
    }
}

#[async_trait]
impl Node for SubgraphNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &RunContext, input: Value) -> Result<Value, RuntimeError> {
        let pipeline = ctx.pipeline();
        pipeline
            .subgraph_starting(&SubgraphStarting {
                run_id: ctx.run_id().to_string(),
                subgraph_name: self.inner.name().to_string(),
                input: input.clone(),
            })
            .await;

        match run_strategy_from(&self.inner, ctx, START, input).await {
            Ok(output) => {
                pipeline
                    .subgraph_completed(&SubgraphCompleted {
                        run_id: ctx.run_id().to_string(),
                        subgraph_name: self.inner.name().to_string(),
                        outcome: RunOutcome::Success {
                            output: output.clone(),
                        },
                    })
                    .await;
                Ok(output)
            }
            Err(err) => {
                pipeline
                    .subgraph_failed(&SubgraphFailed {
                        run_id: ctx.run_id().to_string(),
                        subgraph_name: self.inner.name().to_string(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }
}
