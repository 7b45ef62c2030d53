//! Strategy graph visitors: Graphviz DOT and plain-text rendering.

use std::fmt::Write;

use super::strategy::Strategy;
use super::{FINISH, START};

/// Generate a Graphviz DOT representation of the strategy graph.
pub fn generate_dot(strategy: &Strategy) -> String {
    let mut dot = String::from("digraph {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=box];\n\n");

    dot.push_str(&format!(
        "  \"{}\" [label=\"START\", style=bold, fillcolor=lightgreen];\n",
        START
    ));
    dot.push_str(&format!(
        "  \"{}\" [label=\"FINISH\", style=bold, fillcolor=lightcoral];\n",
        FINISH
    ));
    for node_id in strategy.node_ids() {
        dot.push_str(&format!("  \"{}\";\n", node_id));
    }
    dot.push('\n');
    for (from, to) in strategy.edge_pairs() {
        dot.push_str(&format!("  \"{}\" -> \"{}\";\n", from, to));
    }
    dot.push_str("}\n");
    dot
}

/// Generate a plain-text summary of nodes and edges.
pub fn generate_text(strategy: &Strategy) -> String {
    let mut text = String::new();
    writeln!(text, "Strategy: {}", strategy.name()).unwrap();
    writeln!(text, "Nodes: {}", strategy.node_ids().len()).unwrap();
    for node_id in strategy.node_ids() {
        writeln!(text, "  {}", node_id).unwrap();
    }
    writeln!(text, "Edges:").unwrap();
    for (from, to) in strategy.edge_pairs() {
        writeln!(text, "  {} -> {}", from, to).unwrap();
    }
    text
}
