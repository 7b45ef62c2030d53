//! Strategy: a named graph with distinguished start and finish nodes.
//!
//! Strategies are reentrant and reusable across runs; all per-run mutable
//! state lives in the run context. [`StrategyBuilder`] validates the graph
//! shape at build time: known edge endpoints, an entry edge from START, and
//! a reachable FINISH.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use super::edge::Edge;
use super::node::Node;
use super::{FINISH, START};

/// Build-time graph validation errors.
#[derive(Debug, Error)]
pub enum StrategyBuildError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("node id is reserved: {0}")]
    ReservedNodeId(String),
    #[error("edge references unknown node: {0}")]
    NodeNotFound(String),
    #[error("no edge from start")]
    MissingStart,
    #[error("finish is unreachable: no edge targets it")]
    MissingFinish,
}

/// Strategy metadata; the version gates checkpoint compatibility.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StrategyMetadata {
    pub version: u64,
}

/// Immutable, reusable strategy graph.
pub struct Strategy {
    name: String,
    metadata: StrategyMetadata,
    nodes: HashMap<String, Arc<dyn Node>>,
    /// Outgoing edges per node, in declaration order.
    edges: HashMap<String, Vec<Edge>>,
    /// (from, to) pairs in declaration order, for visitors.
    edge_list: Vec<(String, String)>,
    /// Node ids in insertion order, for visitors.
    node_order: Vec<String>,
}

impl Strategy {
    pub fn builder(name: impl Into<String>) -> StrategyBuilder {
        StrategyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &StrategyMetadata {
        &self.metadata
    }

    pub fn node(&self, id: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(id).cloned()
    }

    /// Outgoing edges in declaration order; empty for unknown ids.
    pub fn edges_from(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[String] {
        &self.node_order
    }

    /// (from, to) pairs in declaration order.
    pub fn edge_pairs(&self) -> &[(String, String)] {
        &self.edge_list
    }

    /// True when no two nodes share a display name; the persistence feature
    /// requires this because checkpoints address nodes by name.
    pub fn has_unique_node_names(&self) -> bool {
        let mut seen = HashSet::new();
        self.node_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .all(|node| seen.insert(node.name().to_string()))
    }
}

/// Builder for [`Strategy`]; `build` validates the graph shape.
pub struct StrategyBuilder {
    name: String,
    metadata: StrategyMetadata,
    nodes: HashMap<String, Arc<dyn Node>>,
    node_order: Vec<String>,
    edges: Vec<(String, Edge)>,
    error: Option<StrategyBuildError>,
}

impl StrategyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: StrategyMetadata::default(),
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            error: None,
        }
    }

    pub fn metadata(mut self, metadata: StrategyMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.metadata.version = version;
        self
    }

    /// Adds a node; duplicate or reserved ids fail at `build`.
    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        let id = node.id().to_string();
        if id == START || id == FINISH {
            self.error
                .get_or_insert(StrategyBuildError::ReservedNodeId(id));
            return self;
        }
        if self.nodes.contains_key(&id) {
            self.error
                .get_or_insert(StrategyBuildError::DuplicateNode(id));
            return self;
        }
        self.node_order.push(id.clone());
        self.nodes.insert(id, node);
        self
    }

    /// Declares an outgoing edge of `from`. Declaration order is the
    /// evaluation order at runtime.
    pub fn edge(mut self, from: impl Into<String>, edge: Edge) -> Self {
        self.edges.push((from.into(), edge));
        self
    }

    pub fn build(self) -> Result<Strategy, StrategyBuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut has_start = false;
        let mut has_finish = false;
        for (from, edge) in &self.edges {
            if from == START {
                has_start = true;
            } else if !self.nodes.contains_key(from) {
                return Err(StrategyBuildError::NodeNotFound(from.clone()));
            }
            if edge.target() == FINISH {
                has_finish = true;
            } else if !self.nodes.contains_key(edge.target()) {
                return Err(StrategyBuildError::NodeNotFound(edge.target().to_string()));
            }
        }
        if !has_start {
            return Err(StrategyBuildError::MissingStart);
        }
        if !has_finish {
            return Err(StrategyBuildError::MissingFinish);
        }

        let mut edge_list = Vec::with_capacity(self.edges.len());
        let mut edges: HashMap<String, Vec<Edge>> = HashMap::new();
        for (from, edge) in self.edges {
            edge_list.push((from.clone(), edge.target().to_string()));
            edges.entry(from).or_default().push(edge);
        }

        Ok(Strategy {
            name: self.name,
            metadata: self.metadata,
            nodes: self.nodes,
            edges,
            edge_list,
            node_order: self.node_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FnNode;

    fn passthrough(id: &str) -> Arc<dyn Node> {
        Arc::new(FnNode::new(id, |_, value| {
            Box::pin(async move { Ok(value) })
        }))
    }

    /// **Scenario**: A valid linear graph builds and exposes edges in
    /// declaration order.
    #[test]
    fn builds_linear_graph() {
        let strategy = Strategy::builder("linear")
            .add_node(passthrough("a"))
            .add_node(passthrough("b"))
            .edge(START, Edge::to("a"))
            .edge("a", Edge::to("b"))
            .edge("b", Edge::to(FINISH))
            .build()
            .expect("valid graph");
        assert_eq!(strategy.name(), "linear");
        assert_eq!(strategy.edges_from("a").len(), 1);
        assert_eq!(strategy.edges_from("a")[0].target(), "b");
        assert_eq!(strategy.node_ids(), &["a", "b"]);
        assert!(strategy.has_unique_node_names());
    }

    /// **Scenario**: Build fails when an edge references an unknown node.
    #[test]
    fn rejects_unknown_edge_target() {
        let result = Strategy::builder("bad")
            .add_node(passthrough("a"))
            .edge(START, Edge::to("a"))
            .edge("a", Edge::to("ghost"))
            .build();
        match result {
            Err(StrategyBuildError::NodeNotFound(id)) => assert_eq!(id, "ghost"),
            other => panic!("expected NodeNotFound, got {:?}", other.err()),
        }
    }

    /// **Scenario**: Build fails without a START edge or a FINISH target.
    #[test]
    fn rejects_missing_start_or_finish() {
        let result = Strategy::builder("no-start")
            .add_node(passthrough("a"))
            .edge("a", Edge::to(FINISH))
            .build();
        assert!(matches!(result, Err(StrategyBuildError::MissingStart)));

        let result = Strategy::builder("no-finish")
            .add_node(passthrough("a"))
            .edge(START, Edge::to("a"))
            .build();
        assert!(matches!(result, Err(StrategyBuildError::MissingFinish)));
    }

    /// **Scenario**: Duplicate and reserved node ids are rejected.
    #[test]
    fn rejects_duplicate_and_reserved_ids() {
        let result = Strategy::builder("dup")
            .add_node(passthrough("a"))
            .add_node(passthrough("a"))
            .edge(START, Edge::to("a"))
            .edge("a", Edge::to(FINISH))
            .build();
        assert!(matches!(result, Err(StrategyBuildError::DuplicateNode(id)) if id == "a"));

        let result = Strategy::builder("reserved")
            .add_node(passthrough(START))
            .build();
        assert!(matches!(result, Err(StrategyBuildError::ReservedNodeId(_))));
    }
}
