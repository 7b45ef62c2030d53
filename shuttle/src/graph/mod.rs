//! Graph strategies: nodes + predicate edges, built and then walked by the
//! executor.
//!
//! A strategy is a named graph with distinguished start and finish nodes.
//! Build with [`StrategyBuilder`] (`add_node` / `edge`, using [`START`] and
//! [`FINISH`] for entry/exit), then hand to an agent to run. Edges are
//! evaluated in declaration order; the first whose forward function returns
//! a value wins.

mod edge;
mod executor;
mod logging;
mod node;
mod nodes;
mod strategy;
mod subgraph;
mod visualization;

pub use edge::{Edge, ForwardFn};
pub(crate) use executor::run_strategy_from;
pub use logging::{
    log_node_complete, log_node_failed, log_node_start, log_run_complete, log_run_error,
    log_run_start,
};
pub use node::{message_from_value, message_to_value, FnNode, Node};
pub use nodes::{
    ExecuteToolNode, LlmRequestNode, SelectChoiceNode, SendResultsMultipleChoicesNode,
    SendToolResultNode, TrimHistoryNode, TrimPolicy,
};
pub use strategy::{Strategy, StrategyBuildError, StrategyBuilder, StrategyMetadata};
pub use subgraph::SubgraphNode;
pub use visualization::{generate_dot, generate_text};

/// Sentinel for graph entry: the run starts here and input passes through
/// the start node's edges untransformed.
pub const START: &str = "__start__";

/// Sentinel for graph exit: reaching it ends the run with the current value.
pub const FINISH: &str = "__finish__";
