//! Pipeline-instrumented prompt executor.
//!
//! Wraps any [`PromptExecutor`] so that `LLMCallStarting`/`LLMCallCompleted`
//! and the streaming events fire around each call, tagged with the run id.
//! Ordering: `Completed` fires after the final frame; on error `Failed`
//! fires exactly once and `Completed` does not.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::message::Message;
use crate::pipeline::{
    LlmCallCompleted, LlmCallStarting, LlmStreamCompleted, LlmStreamFailed,
    LlmStreamFrameReceived, LlmStreamStarting, Pipeline,
};
use crate::prompt::Prompt;
use crate::tools::ToolDescriptor;

use super::{PromptExecutor, StreamFrame};

/// Proxy around a provider client; see module docs.
pub struct InstrumentedExecutor {
    inner: Arc<dyn PromptExecutor>,
    pipeline: Arc<Pipeline>,
    run_id: String,
}

impl InstrumentedExecutor {
    pub fn new(inner: Arc<dyn PromptExecutor>, pipeline: Arc<Pipeline>, run_id: String) -> Self {
        Self {
            inner,
            pipeline,
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[async_trait]
impl PromptExecutor for InstrumentedExecutor {
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, RuntimeError> {
        self.pipeline
            .llm_call_starting(&LlmCallStarting {
                run_id: self.run_id.clone(),
                prompt: prompt.clone(),
                model: model.to_string(),
                tools: tools.to_vec(),
            })
            .await;
        let responses = self.inner.execute(prompt, model, tools).await?;
        self.pipeline
            .llm_call_completed(&LlmCallCompleted {
                run_id: self.run_id.clone(),
                prompt: prompt.clone(),
                model: model.to_string(),
                responses: responses.clone(),
            })
            .await;
        Ok(responses)
    }

    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        frame_tx: mpsc::Sender<StreamFrame>,
    ) -> Result<Vec<Message>, RuntimeError> {
        self.pipeline
            .llm_stream_starting(&LlmStreamStarting {
                run_id: self.run_id.clone(),
                model: model.to_string(),
            })
            .await;

        // Intercept the frame channel so each frame fires an event before
        // it reaches the caller.
        let (inner_tx, mut inner_rx) = mpsc::channel::<StreamFrame>(64);
        let pipeline = Arc::clone(&self.pipeline);
        let run_id = self.run_id.clone();
        let forward = tokio::spawn(async move {
            while let Some(frame) = inner_rx.recv().await {
                pipeline
                    .llm_stream_frame(&LlmStreamFrameReceived {
                        run_id: run_id.clone(),
                        frame: frame.clone(),
                    })
                    .await;
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let result = self
            .inner
            .execute_streaming(prompt, model, tools, inner_tx)
            .await;
        let _ = forward.await;

        match result {
            Ok(responses) => {
                self.pipeline
                    .llm_stream_completed(&LlmStreamCompleted {
                        run_id: self.run_id.clone(),
                        model: model.to_string(),
                    })
                    .await;
                Ok(responses)
            }
            Err(err) => {
                self.pipeline
                    .llm_stream_failed(&LlmStreamFailed {
                        run_id: self.run_id.clone(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn execute_multiple(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        n: u32,
    ) -> Result<Vec<Vec<Message>>, RuntimeError> {
        self.pipeline
            .llm_call_starting(&LlmCallStarting {
                run_id: self.run_id.clone(),
                prompt: prompt.clone(),
                model: model.to_string(),
                tools: tools.to_vec(),
            })
            .await;
        let choices = self.inner.execute_multiple(prompt, model, tools, n).await?;
        self.pipeline
            .llm_call_completed(&LlmCallCompleted {
                run_id: self.run_id.clone(),
                prompt: prompt.clone(),
                model: model.to_string(),
                responses: choices.iter().flatten().cloned().collect(),
            })
            .await;
        Ok(choices)
    }
}
