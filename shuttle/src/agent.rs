//! Agent: a strategy bound to a run context, executed once.
//!
//! Build with [`AgentBuilder`]: strategy, prompt, model, tools, executor,
//! and features. `run(input)` walks the strategy to completion, firing
//! agent lifecycle events around the strategy run. A context is single-use;
//! re-running a consumed agent is a programmer error and panics. After a
//! checkpoint rollback the context carries a resume point and `resume()`
//! continues from the restored node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::{CachingExecutor, PromptCache};
use crate::clock::{Clock, SystemClock};
use crate::error::RuntimeError;
use crate::graph::{run_strategy_from, Strategy, START};
use crate::llm::{InstrumentedExecutor, LlmContext, PromptExecutor};
use crate::pipeline::{
    install_system_features, AgentClosing, AgentCompleted, AgentExecutionFailed, AgentStarting,
    Environment, EnvironmentTransforming, Pipeline,
};
use crate::prompt::Prompt;
use crate::storage::KeyValueStorage;
use crate::tools::ToolRegistry;

/// Per-run configuration.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Upper bound on node executions per run; exceeding it fails the run.
    pub max_agent_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_agent_iterations: 50,
        }
    }
}

impl AgentConfig {
    pub fn with_max_agent_iterations(mut self, max: usize) -> Self {
        self.max_agent_iterations = max;
        self
    }
}

struct AgentState {
    iterations: usize,
    is_active: bool,
}

/// Where a rolled-back context resumes.
pub(crate) struct ResumePoint {
    pub node_id: String,
    pub input: Value,
}

/// The per-run bag: prompt context, tools, scratchpad, pipeline, and state.
pub struct RunContext {
    agent_id: String,
    run_id: String,
    input: Mutex<Value>,
    config: AgentConfig,
    llm: LlmContext,
    tools: Arc<ToolRegistry>,
    storage: KeyValueStorage,
    strategy_name: String,
    strategy_version: u64,
    pipeline: Arc<Pipeline>,
    cancellation: CancellationToken,
    state: Mutex<AgentState>,
    resume: Mutex<Option<ResumePoint>>,
}

impl RunContext {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn input(&self) -> Value {
        self.input.lock().unwrap().clone()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn llm(&self) -> &LlmContext {
        &self.llm
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn storage(&self) -> &KeyValueStorage {
        &self.storage
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn strategy_version(&self) -> u64 {
        self.strategy_version
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn iterations(&self) -> usize {
        self.state.lock().unwrap().iterations
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().is_active
    }

    pub(crate) fn increment_iterations(&self) {
        self.state.lock().unwrap().iterations += 1;
    }

    pub(crate) fn close(&self) {
        self.state.lock().unwrap().is_active = false;
    }

    pub(crate) fn reopen(&self) {
        self.state.lock().unwrap().is_active = true;
    }

    fn set_input(&self, input: Value) {
        *self.input.lock().unwrap() = input;
    }

    pub fn check_cancelled(&self) -> Result<(), RuntimeError> {
        if self.cancellation.is_cancelled() {
            Err(RuntimeError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_resume_point(&self, node_id: String, input: Value) {
        *self.resume.lock().unwrap() = Some(ResumePoint { node_id, input });
    }

    pub(crate) fn take_resume_point(&self) -> Option<ResumePoint> {
        self.resume.lock().unwrap().take()
    }
}

/// An agent: one strategy, one context, one run.
pub struct Agent {
    strategy: Arc<Strategy>,
    ctx: Arc<RunContext>,
    environment: Environment,
    consumed: AtomicBool,
}

impl Agent {
    pub fn builder(strategy: Arc<Strategy>, executor: Arc<dyn PromptExecutor>) -> AgentBuilder {
        AgentBuilder::new(strategy, executor)
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Token to cancel this run cooperatively.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancellation.clone()
    }

    /// Runs the strategy over the input. The context is single-use;
    /// calling `run` on a consumed agent panics.
    pub async fn run(&self, input: Value) -> Result<Value, RuntimeError> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            panic!("agent context is single-use; run() called on a consumed context");
        }
        self.ctx.set_input(input.clone());
        let pipeline = self.ctx.pipeline();
        pipeline
            .environment_transforming(&EnvironmentTransforming {
                agent_id: self.ctx.agent_id.clone(),
                variables: self.environment.vars().clone(),
            })
            .await;
        pipeline
            .agent_starting(&AgentStarting {
                agent_id: self.ctx.agent_id.clone(),
                run_id: self.ctx.run_id.clone(),
                strategy_name: self.strategy.name().to_string(),
                input: input.clone(),
            })
            .await;

        let result = run_strategy_from(&self.strategy, &self.ctx, START, input).await;
        self.finish(result).await
    }

    /// Continues from the resume point left by a checkpoint rollback.
    pub async fn resume(&self) -> Result<Value, RuntimeError> {
        let point = self.ctx.take_resume_point().ok_or_else(|| {
            RuntimeError::ExecutionFailed("no resume point; roll back to a checkpoint first".into())
        })?;
        self.ctx.reopen();
        let pipeline = self.ctx.pipeline();
        pipeline
            .agent_starting(&AgentStarting {
                agent_id: self.ctx.agent_id.clone(),
                run_id: self.ctx.run_id.clone(),
                strategy_name: self.strategy.name().to_string(),
                input: point.input.clone(),
            })
            .await;
        let result = run_strategy_from(&self.strategy, &self.ctx, &point.node_id, point.input).await;
        self.finish(result).await
    }

    async fn finish(&self, result: Result<Value, RuntimeError>) -> Result<Value, RuntimeError> {
        let pipeline = self.ctx.pipeline();
        match result {
            Ok(output) => {
                pipeline
                    .agent_completed(&AgentCompleted {
                        agent_id: self.ctx.agent_id.clone(),
                        run_id: self.ctx.run_id.clone(),
                        output: output.clone(),
                    })
                    .await;
                self.ctx.close();
                pipeline
                    .agent_closing(&AgentClosing {
                        agent_id: self.ctx.agent_id.clone(),
                        run_id: self.ctx.run_id.clone(),
                    })
                    .await;
                Ok(output)
            }
            Err(err) => {
                self.ctx.close();
                if matches!(err, RuntimeError::Cancelled) {
                    // Cancellation closes first, then surfaces the failure.
                    pipeline
                        .agent_closing(&AgentClosing {
                            agent_id: self.ctx.agent_id.clone(),
                            run_id: self.ctx.run_id.clone(),
                        })
                        .await;
                    pipeline
                        .agent_execution_failed(&AgentExecutionFailed {
                            agent_id: self.ctx.agent_id.clone(),
                            run_id: self.ctx.run_id.clone(),
                            error_kind: err.kind().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                } else {
                    pipeline
                        .agent_execution_failed(&AgentExecutionFailed {
                            agent_id: self.ctx.agent_id.clone(),
                            run_id: self.ctx.run_id.clone(),
                            error_kind: err.kind().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                    pipeline
                        .agent_closing(&AgentClosing {
                            agent_id: self.ctx.agent_id.clone(),
                            run_id: self.ctx.run_id.clone(),
                        })
                        .await;
                }
                Err(err)
            }
        }
    }
}

/// Builder for [`Agent`]; chain `with_*` setters, install features, then
/// `build()`.
pub struct AgentBuilder {
    agent_id: String,
    strategy: Arc<Strategy>,
    executor: Arc<dyn PromptExecutor>,
    prompt: Prompt,
    model: String,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    clock: Arc<dyn Clock>,
    pipeline: Arc<Pipeline>,
    environment: Environment,
    system_feature_overrides: Option<Vec<String>>,
    cache: Option<Arc<dyn PromptCache>>,
}

impl AgentBuilder {
    pub fn new(strategy: Arc<Strategy>, executor: Arc<dyn PromptExecutor>) -> Self {
        Self {
            agent_id: "agent".into(),
            strategy,
            executor,
            prompt: Prompt::new("prompt"),
            model: String::new(),
            tools: Arc::new(ToolRegistry::new()),
            config: AgentConfig::default(),
            clock: Arc::new(SystemClock),
            pipeline: Arc::new(Pipeline::new()),
            environment: Environment::from_process(),
            system_feature_overrides: None,
            cache: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Feature keys that override the environment's feature list.
    pub fn with_system_features(mut self, keys: Vec<String>) -> Self {
        self.system_feature_overrides = Some(keys);
        self
    }

    pub fn with_prompt_cache(mut self, cache: Arc<dyn PromptCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Installs a user feature; user installations win over system ones.
    pub fn install<F>(self, feature: Arc<F>) -> Self
    where
        F: crate::pipeline::Feature + 'static,
    {
        self.pipeline.install(feature);
        self
    }

    pub fn build(self) -> Agent {
        let run_id = uuid::Uuid::new_v4().to_string();

        // System features install after user ones so duplicates skip.
        install_system_features(
            &self.pipeline,
            &self.environment,
            self.system_feature_overrides.as_deref(),
        );

        let mut executor: Arc<dyn PromptExecutor> = self.executor;
        if let Some(cache) = self.cache {
            executor = Arc::new(CachingExecutor::new(executor, cache));
        }
        let executor: Arc<dyn PromptExecutor> = Arc::new(InstrumentedExecutor::new(
            executor,
            Arc::clone(&self.pipeline),
            run_id.clone(),
        ));

        let llm = LlmContext::new(
            self.prompt,
            self.tools.descriptors(),
            self.model,
            executor,
            Arc::clone(&self.clock),
        );

        let ctx = Arc::new(RunContext {
            agent_id: self.agent_id,
            run_id,
            input: Mutex::new(Value::Null),
            config: self.config,
            llm,
            tools: self.tools,
            storage: KeyValueStorage::new(),
            strategy_name: self.strategy.name().to_string(),
            strategy_version: self.strategy.metadata().version,
            pipeline: self.pipeline,
            cancellation: CancellationToken::new(),
            state: Mutex::new(AgentState {
                iterations: 0,
                is_active: true,
            }),
            resume: Mutex::new(None),
        });

        Agent {
            strategy: self.strategy,
            ctx,
            environment: self.environment,
            consumed: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::graph::{Edge, FnNode, Node, FINISH};
    use crate::llm::MockPromptExecutor;

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

    fn mock_agent() -> Agent {
        let clock = Arc::new(FixedClock::at_epoch());
        let executor = Arc::new(MockPromptExecutor::new(clock.clone()));
        Agent::builder(echo_strategy(), executor)
            .with_clock(clock)
            .with_environment(Environment::empty())
            .build()
    }

    /// **Scenario**: A passthrough strategy returns its input; the context is
    /// closed afterwards with one iteration counted.
    #[tokio::test]
    async fn run_echo() {
        let agent = mock_agent();
        let out = agent.run(serde_json::json!("hello")).await.unwrap();
        assert_eq!(out, serde_json::json!("hello"));
        assert!(!agent.context().is_active());
        assert_eq!(agent.context().iterations(), 1);
    }

    /// **Scenario**: Re-running a consumed context panics.
    #[tokio::test]
    #[should_panic(expected = "single-use")]
    async fn rerun_panics() {
        let agent = mock_agent();
        let _ = agent.run(serde_json::json!(1)).await;
        let _ = agent.run(serde_json::json!(2)).await;
    }

    /// **Scenario**: A pre-cancelled token fails the run with Cancelled and
    /// closes the context.
    #[tokio::test]
    async fn cancelled_run() {
        let agent = mock_agent();
        agent.cancellation_token().cancel();
        let err = agent.run(serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
        assert!(!agent.context().is_active());
    }

    /// **Scenario**: resume without a rollback is an error.
    #[tokio::test]
    async fn resume_without_rollback() {
        let agent = mock_agent();
        let err = agent.resume().await.unwrap_err();
        assert!(err.to_string().contains("no resume point"));
    }
}
