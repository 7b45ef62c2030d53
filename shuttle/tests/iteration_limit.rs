//! End-to-end: a looping strategy hits the iteration limit and fails the
//! run instead of stopping silently.

mod common;

use std::sync::Arc;

use common::Recorder;
use shuttle::{
    Agent, AgentConfig, Edge, Environment, FixedClock, LlmRequestNode, MockPromptExecutor, Node,
    PromptBuilder, RuntimeError, Strategy, FINISH, START,
};

#[tokio::test]
async fn iteration_limit_fails_run() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    for _ in 0..4 {
        executor.push_assistant("again");
    }

    // llm loops on itself; FINISH exists but is never selected because the
    // self-edge is declared first.
    let llm: Arc<dyn Node> = Arc::new(LlmRequestNode::new("llm"));
    let strategy = Arc::new(
        Strategy::builder("llm-loop")
            .add_node(llm)
            .edge(START, Edge::to("llm"))
            .edge("llm", Edge::to("llm"))
            .edge("llm", Edge::to(FINISH))
            .build()
            .unwrap(),
    );

    let recorder = Arc::new(Recorder::new());
    let agent = Agent::builder(strategy, executor.clone())
        .with_clock(clock.clone())
        .with_environment(Environment::empty())
        .with_prompt(PromptBuilder::new("chat", clock).user("go").build())
        .with_config(AgentConfig::default().with_max_agent_iterations(3))
        .install(recorder.clone())
        .build();

    let err = agent.run(serde_json::json!("go")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::IterationLimitExceeded(3)));

    // Exactly three node executions ran.
    assert_eq!(agent.context().iterations(), 3);
    assert_eq!(executor.call_count(), 3);

    let events = recorder.recorded();
    assert!(events.contains(&"AgentExecutionFailed(IterationLimitExceeded)".to_string()));
    assert!(!events.contains(&"AgentCompleted".to_string()));
    assert!(!events.iter().any(|e| e.starts_with("NodeExecutionFailed")));
}

/// Output with no matching edge fails the run with NoMatchingEdge.
#[tokio::test]
async fn no_matching_edge_fails_run() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    executor.push_assistant("unroutable");

    let llm: Arc<dyn Node> = Arc::new(LlmRequestNode::new("llm"));
    let strategy = Arc::new(
        Strategy::builder("dead-end")
            .add_node(llm)
            .edge(START, Edge::to("llm"))
            .edge("llm", Edge::to_when(FINISH, |_| false))
            .build()
            .unwrap(),
    );

    let agent = Agent::builder(strategy, executor)
        .with_clock(clock.clone())
        .with_environment(Environment::empty())
        .with_prompt(PromptBuilder::new("chat", clock).user("go").build())
        .build();

    let err = agent.run(serde_json::json!("go")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::NoMatchingEdge(node) if node == "llm"));
}
