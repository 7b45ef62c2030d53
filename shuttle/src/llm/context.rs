//! LLM context: the single point through which prompts are mutated and
//! requests issued.
//!
//! Reads are concurrent; writes go through an exclusive [`WriteSession`]
//! (at most one active per context, acquisition blocks). Every request
//! appends its produced messages to the prompt after the pipeline's
//! completed hook has returned; the executor handed to this context is
//! expected to be the instrumented proxy.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::message::Message;
use crate::prompt::Prompt;
use crate::tools::ToolDescriptor;

use super::{ChoiceSelectionStrategy, PromptExecutor, StreamFrame};

#[derive(Clone)]
struct LlmState {
    prompt: Prompt,
    tools: Vec<ToolDescriptor>,
    model: String,
}

/// Owned snapshot of prompt, tools, and model.
#[derive(Clone)]
pub struct LlmSnapshot {
    pub prompt: Prompt,
    pub tools: Vec<ToolDescriptor>,
    pub model: String,
}

/// Shared LLM context; clones share the same state.
#[derive(Clone)]
pub struct LlmContext {
    state: Arc<RwLock<LlmState>>,
    executor: Arc<dyn PromptExecutor>,
    clock: Arc<dyn Clock>,
}

impl LlmContext {
    pub fn new(
        prompt: Prompt,
        tools: Vec<ToolDescriptor>,
        model: impl Into<String>,
        executor: Arc<dyn PromptExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(LlmState {
                prompt,
                tools,
                model: model.into(),
            })),
            executor,
            clock,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Concurrent-safe read access; multiple read sessions may be open.
    pub async fn read_session(&self) -> ReadSession {
        ReadSession {
            guard: Arc::clone(&self.state).read_owned().await,
        }
    }

    /// Owned snapshot of the current state.
    pub async fn snapshot(&self) -> LlmSnapshot {
        let guard = self.state.read().await;
        LlmSnapshot {
            prompt: guard.prompt.clone(),
            tools: guard.tools.clone(),
            model: guard.model.clone(),
        }
    }

    /// Exclusive write access; blocks until any other writer releases.
    pub async fn write_session(&self) -> WriteSession {
        WriteSession {
            guard: Arc::clone(&self.state).write_owned().await,
            executor: Arc::clone(&self.executor),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Read session: prompt/tools/model accessors, no mutation.
pub struct ReadSession {
    guard: OwnedRwLockReadGuard<LlmState>,
}

impl ReadSession {
    pub fn prompt(&self) -> &Prompt {
        &self.guard.prompt
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.guard.tools
    }

    pub fn model(&self) -> &str {
        &self.guard.model
    }
}

/// Exclusive write session over prompt, tools, and model.
///
/// Dropping the session releases the writer lock.
pub struct WriteSession {
    guard: OwnedRwLockWriteGuard<LlmState>,
    executor: Arc<dyn PromptExecutor>,
    clock: Arc<dyn Clock>,
}

impl WriteSession {
    pub fn prompt(&self) -> &Prompt {
        &self.guard.prompt
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.guard.tools
    }

    pub fn model(&self) -> &str {
        &self.guard.model
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Replaces the prompt atomically.
    pub fn set_prompt(&mut self, prompt: Prompt) {
        self.guard.prompt = prompt;
    }

    /// Mutates the prompt in place through a closure.
    pub fn update_prompt(&mut self, f: impl FnOnce(&mut Prompt)) {
        f(&mut self.guard.prompt);
    }

    pub fn append_messages(&mut self, messages: &[Message]) {
        self.guard.prompt.messages.extend_from_slice(messages);
    }

    pub fn set_tools(&mut self, tools: Vec<ToolDescriptor>) {
        self.guard.tools = tools;
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.guard.model = model.into();
    }

    /// One complete LLM call. The produced messages are appended to the
    /// prompt after the call's completed hook has returned, and are also
    /// returned to the caller.
    pub async fn request_llm(&mut self) -> Result<Vec<Message>, RuntimeError> {
        let responses = self
            .executor
            .execute(&self.guard.prompt, &self.guard.model, &self.guard.tools)
            .await?;
        self.append_messages(&responses);
        Ok(responses)
    }

    /// Streaming LLM call: frames are forwarded through `frame_tx` as they
    /// arrive, terminated by a single end frame; the complete responses are
    /// appended and returned once the stream finishes.
    pub async fn request_llm_streaming(
        &mut self,
        frame_tx: mpsc::Sender<StreamFrame>,
    ) -> Result<Vec<Message>, RuntimeError> {
        let responses = self
            .executor
            .execute_streaming(
                &self.guard.prompt,
                &self.guard.model,
                &self.guard.tools,
                frame_tx,
            )
            .await?;
        self.append_messages(&responses);
        Ok(responses)
    }

    /// `n` alternative response sequences. Nothing is appended; pass the
    /// result to [`select_choice`](Self::select_choice) to commit one.
    pub async fn request_llm_multiple_choices(
        &mut self,
        n: u32,
    ) -> Result<Vec<Vec<Message>>, RuntimeError> {
        self.executor
            .execute_multiple(&self.guard.prompt, &self.guard.model, &self.guard.tools, n)
            .await
    }

    /// Selects one alternative via the strategy; the choice becomes the
    /// canonical next message(s) on the prompt.
    pub async fn select_choice(
        &mut self,
        strategy: &dyn ChoiceSelectionStrategy,
        choices: Vec<Vec<Message>>,
    ) -> Result<Vec<Message>, RuntimeError> {
        let index = strategy.choose(&choices).await?;
        let chosen = choices.into_iter().nth(index).ok_or_else(|| {
            RuntimeError::ExecutionFailed(format!("choice index {} out of range", index))
        })?;
        self.append_messages(&chosen);
        Ok(chosen)
    }

    /// Runs `block` against this session and unconditionally restores the
    /// prompt afterwards, whether the block succeeded or failed. Used for
    /// history-rewriting requests (e.g. fact extraction) that must not leak
    /// their scratch messages into the conversation.
    pub async fn with_rewritten_prompt<T, F>(&mut self, block: F) -> Result<T, RuntimeError>
    where
        F: for<'a> FnOnce(&'a mut WriteSession) -> BoxFuture<'a, Result<T, RuntimeError>>,
    {
        let saved = self.guard.prompt.clone();
        let result = block(self).await;
        self.guard.prompt = saved;
        result
    }
}
