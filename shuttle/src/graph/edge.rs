//! Edges: predicate + transform from a node's output to the next input.
//!
//! The forward function both filters (None = edge does not fire) and
//! transforms the value handed to the target node. Edges are tried in
//! declaration order; the first match wins.

use std::sync::Arc;

use serde_json::Value;

use crate::agent::RunContext;

/// Forward function: `(ctx, incoming output) -> Option<outgoing input>`.
pub type ForwardFn = Arc<dyn Fn(&RunContext, &Value) -> Option<Value> + Send + Sync>;

/// One outgoing edge of a node.
#[derive(Clone)]
pub struct Edge {
    pub(crate) to: String,
    pub(crate) forward: ForwardFn,
}

impl Edge {
    /// Fully general edge with an explicit forward function.
    pub fn new(
        to: impl Into<String>,
        forward: impl Fn(&RunContext, &Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            to: to.into(),
            forward: Arc::new(forward),
        }
    }

    /// Unconditional edge; forwards the output unchanged.
    pub fn to(to: impl Into<String>) -> Self {
        Self::new(to, |_, value| Some(value.clone()))
    }

    /// Conditional edge; fires when the predicate holds, forwarding the
    /// output unchanged.
    pub fn to_when(
        to: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(to, move |_, value| {
            if predicate(value) {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    /// Target node id.
    pub fn target(&self) -> &str {
        &self.to
    }
}
