//! # Shuttle
//!
//! A graph-strategy runtime for LLM-driven agents: it executes an agent's
//! plan as a directed graph of nodes, mediates every interaction with the
//! model and with tools, streams partial results, persists checkpoints for
//! resume and rollback, and serves incremental task progress over an A2A
//! session bus.
//!
//! ## Design principles
//!
//! - **Deterministic graph walk**: edges are evaluated in declaration
//!   order; the first whose forward function fires wins. Hitting the
//!   iteration limit is a failure, never a silent stop.
//! - **One writer per prompt**: all prompt mutation goes through an
//!   exclusive [`WriteSession`] on the [`LlmContext`]; reads are
//!   concurrent.
//! - **Features over coupling**: tracing, debugging, and persistence hook
//!   typed lifecycle events on the [`Pipeline`] instead of living inside
//!   the executor.
//! - **Injected clock**: no wall-clock reads outside [`Clock`]; tests run
//!   on a [`FixedClock`].
//!
//! ## Main modules
//!
//! - [`graph`]: [`Strategy`], [`StrategyBuilder`], [`Node`], [`Edge`],
//!   library nodes, visualization.
//! - [`agent`]: [`Agent`], [`AgentBuilder`], [`RunContext`],
//!   [`AgentConfig`].
//! - [`llm`]: [`PromptExecutor`] boundary, [`LlmContext`] with
//!   read/write sessions, [`StreamFrame`], [`MockPromptExecutor`].
//! - [`prompt`] / [`message`]: [`Prompt`], [`PromptBuilder`],
//!   [`LlmParams`], [`Message`].
//! - [`tools`]: [`Tool`], [`ToolRegistry`], [`ToolDescriptor`], schema
//!   parsing, the shell execution boundary.
//! - [`pipeline`]: [`Pipeline`], [`EventHandler`], [`Feature`],
//!   system-feature bootstrap.
//! - [`cache`]: [`PromptCache`], [`InMemoryPromptCache`],
//!   [`CachingExecutor`].
//! - [`a2a`]: [`SessionProcessor`], [`TaskStorage`], the task model.
//! - [`persistence`]: [`CheckpointStorageProvider`],
//!   [`PersistenceFeature`], rollback.
//! - [`storage`]: typed per-run scratchpad ([`StorageKey`],
//!   [`KeyValueStorage`]).
//!
//! Wire-level A2A message types live in the `session-event` crate.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shuttle::{
//!     Agent, Edge, FnNode, Node, MockPromptExecutor, Strategy, SystemClock, FINISH, START,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let echo: Arc<dyn Node> = Arc::new(FnNode::new("echo", |_, value| {
//!     Box::pin(async move { Ok(value) })
//! }));
//! let strategy = Arc::new(
//!     Strategy::builder("echo")
//!         .add_node(echo)
//!         .edge(START, Edge::to("echo"))
//!         .edge("echo", Edge::to(FINISH))
//!         .build()
//!         .unwrap(),
//! );
//! let executor = Arc::new(MockPromptExecutor::new(Arc::new(SystemClock)));
//! let agent = Agent::builder(strategy, executor).build();
//! let output = agent.run(serde_json::json!("hello")).await.unwrap();
//! println!("{}", output);
//! # }
//! ```

pub mod a2a;
pub mod agent;
pub mod cache;
pub mod clock;
pub mod error;
pub mod graph;
pub mod llm;
pub mod message;
pub mod persistence;
pub mod pipeline;
pub mod prompt;
pub mod storage;
pub mod tools;

pub use a2a::{
    Artifact, ContextTaskStorage, RequestRejection, SessionError, SessionEvent, SessionFrame,
    SessionProcessor, SessionSubscription, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent, TaskStorage, TaskStorageError,
};
pub use agent::{Agent, AgentBuilder, AgentConfig, RunContext};
pub use cache::{cache_key, CachingExecutor, InMemoryPromptCache, PromptCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::RuntimeError;
pub use graph::{
    generate_dot, generate_text, Edge, ExecuteToolNode, FnNode, LlmRequestNode, Node,
    SelectChoiceNode, SendResultsMultipleChoicesNode, SendToolResultNode, Strategy,
    StrategyBuildError, StrategyBuilder, StrategyMetadata, SubgraphNode, TrimHistoryNode,
    TrimPolicy, FINISH, START,
};
pub use llm::{
    ChoiceSelectionStrategy, FirstChoice, InstrumentedExecutor, LlmContext, LlmSnapshot,
    MockPromptExecutor, PromptExecutor, ReadSession, SelectBy, StreamFrame, WriteSession,
};
pub use message::{
    Attachment, AttachmentContent, FinishReason, Message, RequestMeta, ResponseMeta, TokenUsage,
};
pub use persistence::{
    AgentCheckpointData, CheckpointError, CheckpointFilter, CheckpointStorageProvider,
    FileCheckpointStorage, InMemoryCheckpointStorage, PersistenceFeature, RollbackStrategy,
    RollbackToolRegistry,
};
pub use pipeline::{
    DebuggerFeature, Environment, EventHandler, Feature, Pipeline, TracingFeature, FEATURES_ENV,
};
pub use prompt::{LlmParams, Prompt, PromptBuilder, ToolChoice};
pub use storage::{KeyValueStorage, StorageKey};
pub use tools::shell::{
    AlwaysApprove, Confirmation, ConfirmationHandler, ShellArgs, ShellExecutor, ShellResult,
};
pub use tools::{
    descriptor_from_schema, parse_param_type, validate_args, AdditionalProperties,
    JsonSchemaGenerator, ParamType, Tool, ToolDescriptor, ToolDescriptorSchemaGenerator,
    ToolError, ToolParam, ToolRegistry, MAX_SCHEMA_DEPTH,
};

/// When running `cargo test -p shuttle`, initializes tracing from
/// `RUST_LOG` so unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
