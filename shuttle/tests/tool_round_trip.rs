//! End-to-end: LLM asks for a tool, the tool runs, the result goes back to
//! the LLM, and the final assistant message is the run output.

mod common;

use std::sync::Arc;

use common::{is_assistant, is_tool_call, EvalTool, Recorder};
use shuttle::{
    Agent, Edge, Environment, ExecuteToolNode, FixedClock, LlmRequestNode, MockPromptExecutor,
    Node, PromptBuilder, SendToolResultNode, Strategy, ToolRegistry, FINISH, START,
};

#[tokio::test]
async fn tool_round_trip_produces_answer() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    executor.push_tool_call("eval", serde_json::json!({"expr": "2+2"}));
    executor.push_assistant("4");

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EvalTool)).unwrap();

    let llm: Arc<dyn Node> = Arc::new(LlmRequestNode::new("llm"));
    let tool: Arc<dyn Node> = Arc::new(ExecuteToolNode::new("tool"));
    let send: Arc<dyn Node> = Arc::new(SendToolResultNode::new("send"));
    let strategy = Arc::new(
        Strategy::builder("tool-round-trip")
            .add_node(llm)
            .add_node(tool)
            .add_node(send)
            .edge(START, Edge::to("llm"))
            .edge("llm", Edge::to_when("tool", is_tool_call))
            .edge("llm", Edge::to_when(FINISH, is_assistant))
            .edge("tool", Edge::to("send"))
            .edge("send", Edge::to_when("tool", is_tool_call))
            .edge("send", Edge::to_when(FINISH, is_assistant))
            .build()
            .unwrap(),
    );

    let recorder = Arc::new(Recorder::new());
    let agent = Agent::builder(strategy, executor)
        .with_clock(clock.clone())
        .with_environment(Environment::empty())
        .with_prompt(
            PromptBuilder::new("chat", clock)
                .user("Compute 2+2")
                .build(),
        )
        .with_model("mock-model")
        .with_tools(Arc::new(registry))
        .install(recorder.clone())
        .build();

    let out = agent.run(serde_json::json!("Compute 2+2")).await.unwrap();
    assert_eq!(out["role"], "assistant");
    assert_eq!(out["content"], "4");

    // Prompt grew append-only: user, tool call, tool result, assistant.
    let history = agent.context().llm().snapshot().await.prompt.messages;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content(), "Compute 2+2");
    assert!(matches!(
        &history[1],
        shuttle::Message::ToolCall { tool_name, .. } if tool_name == "eval"
    ));
    assert!(matches!(
        &history[2],
        shuttle::Message::ToolResult { content, .. } if content == "4"
    ));
    assert_eq!(history[3].content(), "4");

    let events = recorder.recorded();
    let expected_prefix = [
        "AgentStarting",
        "StrategyStarting",
        "NodeExecutionStarting(llm)",
        "LLMCallStarting",
        "LLMCallCompleted",
        "NodeExecutionCompleted(llm)",
        "NodeExecutionStarting(tool)",
        "ToolCallStarting(eval)",
        "ToolCallCompleted(eval)",
        "NodeExecutionCompleted(tool)",
        "NodeExecutionStarting(send)",
        "LLMCallStarting",
        "LLMCallCompleted",
        "NodeExecutionCompleted(send)",
    ];
    assert_eq!(&events[..expected_prefix.len()], &expected_prefix[..]);
    assert_eq!(
        &events[expected_prefix.len()..],
        &["StrategyCompleted", "AgentCompleted", "AgentClosing"]
    );
}

/// An LLM reply without tool calls goes straight to FINISH.
#[tokio::test]
async fn direct_answer_skips_tools() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    executor.push_assistant("just text");

    let llm: Arc<dyn Node> = Arc::new(LlmRequestNode::new("llm"));
    let tool: Arc<dyn Node> = Arc::new(ExecuteToolNode::new("tool"));
    let strategy = Arc::new(
        Strategy::builder("direct")
            .add_node(llm)
            .add_node(tool)
            .edge(START, Edge::to("llm"))
            .edge("llm", Edge::to_when("tool", is_tool_call))
            .edge("llm", Edge::to_when(FINISH, is_assistant))
            .edge("tool", Edge::to(FINISH))
            .build()
            .unwrap(),
    );

    let agent = Agent::builder(strategy, executor)
        .with_clock(clock.clone())
        .with_environment(Environment::empty())
        .with_prompt(PromptBuilder::new("chat", clock).user("hi").build())
        .build();

    let out = agent.run(serde_json::json!("hi")).await.unwrap();
    assert_eq!(out["content"], "just text");
    assert_eq!(agent.context().iterations(), 1);
}
