//! The strategy run loop.
//!
//! Walks from the entry point to FINISH, firing pipeline events at every
//! boundary: node starting/completed/failed, strategy starting/completed.
//! Edge selection is deterministic: declaration order, first match wins.
//! Node executions count against the iteration limit; hitting it is a
//! failure, not a silent stop.

use serde_json::Value;

use crate::agent::RunContext;
use crate::error::RuntimeError;
use crate::pipeline::{
    NodeCompleted, NodeFailed, NodeStarting, RunOutcome, StrategyCompleted, StrategyStarting,
};

use super::logging::{
    log_node_complete, log_node_failed, log_node_start, log_run_complete, log_run_error,
    log_run_start,
};
use super::strategy::Strategy;
use super::{FINISH, START};

/// Runs `strategy` from `entry` (START for a fresh run, a node id when
/// resuming from a checkpoint) with the given value.
pub(crate) async fn run_strategy_from(
    strategy: &Strategy,
    ctx: &RunContext,
    entry: &str,
    input: Value,
) -> Result<Value, RuntimeError> {
    let pipeline = ctx.pipeline();
    pipeline
        .strategy_starting(&StrategyStarting {
            run_id: ctx.run_id().to_string(),
            strategy_name: strategy.name().to_string(),
        })
        .await;
    log_run_start(strategy.name());

    match run_loop(strategy, ctx, entry, input).await {
        Ok(output) => {
            pipeline
                .strategy_completed(&StrategyCompleted {
                    run_id: ctx.run_id().to_string(),
                    strategy_name: strategy.name().to_string(),
                    outcome: RunOutcome::Success {
                        output: output.clone(),
                    },
                })
                .await;
            log_run_complete(strategy.name());
            Ok(output)
        }
        Err(err) => {
            pipeline
                .strategy_completed(&StrategyCompleted {
                    run_id: ctx.run_id().to_string(),
                    strategy_name: strategy.name().to_string(),
                    outcome: RunOutcome::Failure {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    },
                })
                .await;
            log_run_error(strategy.name(), &err);
            Err(err)
        }
    }
}

async fn run_loop(
    strategy: &Strategy,
    ctx: &RunContext,
    entry: &str,
    input: Value,
) -> Result<Value, RuntimeError> {
    let pipeline = ctx.pipeline();
    let max_iterations = ctx.config().max_agent_iterations;
    let mut current = entry.to_string();
    let mut value = input;

    loop {
        ctx.check_cancelled()?;
        if current == FINISH {
            return Ok(value);
        }
        if current != START && ctx.iterations() >= max_iterations {
            return Err(RuntimeError::IterationLimitExceeded(max_iterations));
        }

        // START passes the input through without a node execution.
        let output = if current == START {
            value.clone()
        } else {
            let node = strategy.node(&current).ok_or_else(|| {
                RuntimeError::ExecutionFailed(format!("unknown node: {}", current))
            })?;
            log_node_start(node.id());
            pipeline
                .node_starting(&NodeStarting {
                    run_id: ctx.run_id().to_string(),
                    node_id: node.id().to_string(),
                    node_name: node.name().to_string(),
                    input: value.clone(),
                })
                .await;

            match node.execute(ctx, value.clone()).await {
                Ok(output) => {
                    log_node_complete(node.id());
                    let history = ctx.llm().snapshot().await.prompt.messages;
                    pipeline
                        .node_completed(&NodeCompleted {
                            agent_id: ctx.agent_id().to_string(),
                            run_id: ctx.run_id().to_string(),
                            node_id: node.id().to_string(),
                            node_name: node.name().to_string(),
                            input: value.clone(),
                            output: output.clone(),
                            history,
                            strategy_version: strategy.metadata().version,
                        })
                        .await;
                    ctx.increment_iterations();
                    output
                }
                Err(err) => {
                    log_node_failed(node.id(), &err);
                    pipeline
                        .node_failed(&NodeFailed {
                            run_id: ctx.run_id().to_string(),
                            node_id: node.id().to_string(),
                            node_name: node.name().to_string(),
                            error_kind: err.kind().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                    return Err(err);
                }
            }
        };

        // Declaration order; the first edge whose forward function returns
        // a value wins.
        let mut next = None;
        for edge in strategy.edges_from(&current) {
            if let Some(forwarded) = (edge.forward)(ctx, &output) {
                next = Some((edge.target().to_string(), forwarded));
                break;
            }
        }
        match next {
            Some((to, forwarded)) => {
                current = to;
                value = forwarded;
            }
            None => return Err(RuntimeError::NoMatchingEdge(current)),
        }
    }
}
