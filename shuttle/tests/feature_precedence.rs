//! System features install from the environment with defaults; user
//! installations of the same feature win.


use std::sync::Arc;

use shuttle::{
    Agent, DebuggerFeature, Edge, Environment, FixedClock, FnNode, MockPromptExecutor, Node,
    Strategy, FINISH, START,
};

fn echo_strategy() -> Arc<Strategy> {
    let echo: Arc<dyn Node> = Arc::new(FnNode::new("echo", |_, value| {
        Box::pin(async move { Ok(value) })
    }));
    Arc::new(
        Strategy::builder("echo")
            .add_node(echo)
            .edge(START, Edge::to("echo"))
            .edge("echo", Edge::to(FINISH))
            .build()
            .unwrap(),
    )
}

/// The environment lists the debugger on port 11000; the user installs it
/// on port 12000 first. The user's instance wins and the system install is
/// skipped.
#[tokio::test]
async fn user_feature_wins_over_system() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    let environment = Environment::empty()
        .with_var(shuttle::FEATURES_ENV, "debugger")
        .with_var("SHUTTLE_DEBUGGER_PORT", "11000");

    let agent = Agent::builder(echo_strategy(), executor)
        .with_clock(clock)
        .with_environment(environment)
        .install(Arc::new(DebuggerFeature::with_port(12000)))
        .build();

    let pipeline = agent.context().pipeline();
    let debugger: Arc<DebuggerFeature> = pipeline.feature("debugger").expect("installed");
    assert_eq!(debugger.port(), 12000);

    agent.run(serde_json::json!("ping")).await.unwrap();
    assert!(!debugger.trail().is_empty(), "user instance receives events");
}

/// Without a user install, the environment's configuration applies.
#[tokio::test]
async fn system_feature_installs_with_env_config() {
    let clock = Arc::new(FixedClock::at_epoch());
    let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
    let environment = Environment::empty()
        .with_var(shuttle::FEATURES_ENV, "debugger, no_such_feature")
        .with_var("SHUTTLE_DEBUGGER_PORT", "11000");

    let agent = Agent::builder(echo_strategy(), executor)
        .with_clock(clock)
        .with_environment(environment)
        .build();

    let pipeline = agent.context().pipeline();
    let debugger: Arc<DebuggerFeature> = pipeline.feature("debugger").expect("installed");
    assert_eq!(debugger.port(), 11000);
    // The unknown key was ignored.
    assert_eq!(pipeline.installed_keys(), vec!["debugger"]);
}
