//! LLM boundary: the prompt executor contract and streaming frames.
//!
//! The runtime imposes no provider wire format; a [`PromptExecutor`] takes
//! `(prompt, model, tools)` and returns complete response messages or a
//! stream of [`StreamFrame`]s. [`MockPromptExecutor`] scripts responses for
//! tests and examples.

mod context;
mod proxy;

pub use context::{LlmContext, LlmSnapshot, ReadSession, WriteSession};
pub use proxy::InstrumentedExecutor;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::message::{FinishReason, Message, TokenUsage};
use crate::prompt::Prompt;
use crate::tools::ToolDescriptor;

/// One unit of an LLM response delivered incrementally. A stream is a
/// sequence of text/tool deltas terminated by exactly one `End` frame.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamFrame {
    Text {
        delta: String,
    },
    ToolCallDelta {
        id: Option<String>,
        name: Option<String>,
        arguments_delta: String,
    },
    End {
        finish_reason: Option<FinishReason>,
        usage: Option<TokenUsage>,
    },
}

impl StreamFrame {
    pub fn is_end(&self) -> bool {
        matches!(self, StreamFrame::End { .. })
    }
}

/// Executes prompts against a model.
///
/// Implementations must tolerate being wrapped by a proxy that injects
/// pipeline events and attaches a run id (see [`InstrumentedExecutor`]).
#[async_trait]
pub trait PromptExecutor: Send + Sync {
    /// One complete call: zero or more response messages, in order.
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, RuntimeError>;

    /// Streaming call: frames are sent through `frame_tx` as they arrive,
    /// ending with a single `End` frame; the complete response messages are
    /// returned afterwards. A stream is restartable only by issuing a new
    /// request.
    ///
    /// Default implementation calls `execute` and replays the result as one
    /// frame per message followed by `End`.
    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        frame_tx: mpsc::Sender<StreamFrame>,
    ) -> Result<Vec<Message>, RuntimeError> {
        let responses = self.execute(prompt, model, tools).await?;
        let mut finish_reason = None;
        let mut usage = None;
        for message in &responses {
            match message {
                Message::Assistant { content, meta } | Message::Reasoning { content, meta } => {
                    let _ = frame_tx
                        .send(StreamFrame::Text {
                            delta: content.clone(),
                        })
                        .await;
                    finish_reason = meta.finish_reason.clone().or(finish_reason);
                    usage = meta.usage.clone().or(usage);
                }
                Message::ToolCall {
                    id,
                    tool_name,
                    arguments,
                    meta,
                } => {
                    let _ = frame_tx
                        .send(StreamFrame::ToolCallDelta {
                            id: id.clone(),
                            name: Some(tool_name.clone()),
                            arguments_delta: arguments.to_string(),
                        })
                        .await;
                    finish_reason = meta.finish_reason.clone().or(finish_reason);
                    usage = meta.usage.clone().or(usage);
                }
                _ => {}
            }
        }
        let _ = frame_tx
            .send(StreamFrame::End {
                finish_reason,
                usage,
            })
            .await;
        Ok(responses)
    }

    /// `n` alternative response sequences.
    ///
    /// Default implementation issues `n` independent `execute` calls;
    /// providers with native multi-choice support override this.
    async fn execute_multiple(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        n: u32,
    ) -> Result<Vec<Vec<Message>>, RuntimeError> {
        let mut choices = Vec::with_capacity(n as usize);
        for _ in 0..n {
            choices.push(self.execute(prompt, model, tools).await?);
        }
        Ok(choices)
    }
}

/// Picks one of several alternative response sequences.
#[async_trait]
pub trait ChoiceSelectionStrategy: Send + Sync {
    /// Index of the chosen alternative; must be `< choices.len()`.
    async fn choose(&self, choices: &[Vec<Message>]) -> Result<usize, RuntimeError>;
}

/// Always picks the first choice.
pub struct FirstChoice;

#[async_trait]
impl ChoiceSelectionStrategy for FirstChoice {
    async fn choose(&self, choices: &[Vec<Message>]) -> Result<usize, RuntimeError> {
        if choices.is_empty() {
            return Err(RuntimeError::ExecutionFailed(
                "no choices to select from".into(),
            ));
        }
        Ok(0)
    }
}

/// Selects by a custom scoring function (e.g. ask-user, judge model).
pub struct SelectBy {
    select: Arc<dyn Fn(&[Vec<Message>]) -> usize + Send + Sync>,
}

impl SelectBy {
    pub fn new(select: impl Fn(&[Vec<Message>]) -> usize + Send + Sync + 'static) -> Self {
        Self {
            select: Arc::new(select),
        }
    }
}

#[async_trait]
impl ChoiceSelectionStrategy for SelectBy {
    async fn choose(&self, choices: &[Vec<Message>]) -> Result<usize, RuntimeError> {
        let index = (self.select)(choices);
        if index >= choices.len() {
            return Err(RuntimeError::ExecutionFailed(format!(
                "choice index {} out of range ({} choices)",
                index,
                choices.len()
            )));
        }
        Ok(index)
    }
}

/// Scripted executor for tests: pops one pre-built response list per call
/// and records every prompt it sees.
pub struct MockPromptExecutor {
    scripted: std::sync::Mutex<VecDeque<Vec<Message>>>,
    seen: std::sync::Mutex<Vec<Prompt>>,
    clock: Arc<dyn Clock>,
}

impl MockPromptExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            scripted: std::sync::Mutex::new(VecDeque::new()),
            seen: std::sync::Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Queues one response list for the next call.
    pub fn push_response(&self, responses: Vec<Message>) {
        self.scripted.lock().unwrap().push_back(responses);
    }

    /// Queues a single assistant reply.
    pub fn push_assistant(&self, content: impl Into<String>) {
        let meta = crate::message::ResponseMeta::at(self.clock.now())
            .with_finish_reason(FinishReason::Stop);
        self.push_response(vec![Message::assistant(content, meta)]);
    }

    /// Queues a single tool call.
    pub fn push_tool_call(&self, tool_name: impl Into<String>, arguments: serde_json::Value) {
        let meta = crate::message::ResponseMeta::at(self.clock.now())
            .with_finish_reason(FinishReason::ToolCalls);
        self.push_response(vec![Message::tool_call(
            Some(format!("call-{}", self.seen.lock().unwrap().len())),
            tool_name,
            arguments,
            meta,
        )]);
    }

    /// Prompts received so far, in call order.
    pub fn seen_prompts(&self) -> Vec<Prompt> {
        self.seen.lock().unwrap().clone()
    }

    /// Number of calls issued so far.
    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl PromptExecutor for MockPromptExecutor {
    async fn execute(
        &self,
        prompt: &Prompt,
        _model: &str,
        _tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, RuntimeError> {
        self.seen.lock().unwrap().push(prompt.clone());
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RuntimeError::LlmTransport("mock executor exhausted".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_epoch())
    }

    /// **Scenario**: Mock pops scripted responses in order and errors when exhausted.
    #[tokio::test]
    async fn mock_scripted_order() {
        let mock = MockPromptExecutor::new(clock());
        mock.push_assistant("one");
        mock.push_assistant("two");
        let prompt = Prompt::new("p");
        let first = mock.execute(&prompt, "m", &[]).await.unwrap();
        assert_eq!(first[0].content(), "one");
        let second = mock.execute(&prompt, "m", &[]).await.unwrap();
        assert_eq!(second[0].content(), "two");
        assert!(mock.execute(&prompt, "m", &[]).await.is_err());
        assert_eq!(mock.call_count(), 3);
    }

    /// **Scenario**: Default streaming replays the response as frames
    /// terminated by exactly one End frame.
    #[tokio::test]
    async fn default_streaming_terminates_with_end() {
        let mock = MockPromptExecutor::new(clock());
        mock.push_assistant("hello");
        let (tx, mut rx) = mpsc::channel(8);
        let responses = mock
            .execute_streaming(&Prompt::new("p"), "m", &[], tx)
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], StreamFrame::Text { delta } if delta == "hello"));
        assert!(frames[1].is_end());
    }

    /// **Scenario**: Default execute_multiple issues n independent calls.
    #[tokio::test]
    async fn default_multiple_choices() {
        let mock = MockPromptExecutor::new(clock());
        mock.push_assistant("a");
        mock.push_assistant("b");
        mock.push_assistant("c");
        let choices = mock
            .execute_multiple(&Prompt::new("p"), "m", &[], 3)
            .await
            .unwrap();
        assert_eq!(choices.len(), 3);
        assert_eq!(choices[1][0].content(), "b");
    }

    /// **Scenario**: FirstChoice picks index 0; SelectBy validates its index.
    #[tokio::test]
    async fn choice_strategies() {
        let choices = vec![vec![], vec![]];
        assert_eq!(FirstChoice.choose(&choices).await.unwrap(), 0);
        let strategy = SelectBy::new(|choices| choices.len() - 1);
        assert_eq!(strategy.choose(&choices).await.unwrap(), 1);
        let bad = SelectBy::new(|_| 99);
        assert!(bad.choose(&choices).await.is_err());
    }
}
