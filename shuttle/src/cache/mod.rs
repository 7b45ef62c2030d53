//! Prompt cache: fingerprinted at-most-once cache of `(prompt, tools)` to
//! response lists.
//!
//! The key is a base-36 hash of the canonical request serialization with
//! every message timestamp cleared, so prompts differing only in meta
//! timestamps share an entry. Reads hand back deep copies with the
//! response timestamps rewritten to now.

mod in_memory;

pub use in_memory::InMemoryPromptCache;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::llm::{PromptExecutor, StreamFrame};
use crate::message::Message;
use crate::prompt::{LlmParams, Prompt};
use crate::tools::ToolDescriptor;

/// Canonical request: prompt and tools with all timestamps cleared.
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    id: &'a str,
    messages: Vec<Message>,
    params: &'a LlmParams,
    tools: &'a [ToolDescriptor],
}

/// Fingerprint of `(prompt, tools)`; stable across timestamp-only changes.
pub fn cache_key(prompt: &Prompt, tools: &[ToolDescriptor]) -> String {
    let canonical = CanonicalRequest {
        id: &prompt.id,
        messages: prompt
            .messages
            .iter()
            .map(Message::with_cleared_timestamps)
            .collect(),
        params: &prompt.params,
        tools,
    };
    let json = serde_json::to_string(&canonical).expect("canonical request serializes");
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    json.hash(&mut hasher);
    to_base36(hasher.finish())
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

/// Cache of response lists by request fingerprint.
///
/// Implementations must be concurrency-safe, and `get_or_compute` must
/// coalesce concurrent misses on the same key into a single underlying
/// computation, fanning the result out to every waiter.
#[async_trait]
pub trait PromptCache: Send + Sync {
    /// Deep copy of the cached responses with response timestamps rewritten
    /// to now; None on miss.
    async fn get(&self, key: &str) -> Option<Vec<Message>>;

    /// Stores the given responses, replacing any existing entry.
    async fn put(&self, key: &str, responses: Vec<Message>);

    /// Hit path plus at-most-once in-flight computation on miss.
    async fn get_or_compute(
        &self,
        key: &str,
        compute: BoxFuture<'_, Result<Vec<Message>, RuntimeError>>,
    ) -> Result<Vec<Message>, RuntimeError>;

    async fn clear(&self);
}

/// Executor decoration that consults the cache before the provider.
///
/// Only complete (non-streaming, single-choice) calls are cached; streaming
/// and multi-choice requests pass through.
pub struct CachingExecutor {
    inner: Arc<dyn PromptExecutor>,
    cache: Arc<dyn PromptCache>,
}

impl CachingExecutor {
    pub fn new(inner: Arc<dyn PromptExecutor>, cache: Arc<dyn PromptCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl PromptExecutor for CachingExecutor {
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<Message>, RuntimeError> {
        let key = cache_key(prompt, tools);
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.clone();
        let model = model.to_string();
        let tools_owned = tools.to_vec();
        self.cache
            .get_or_compute(
                &key,
                Box::pin(async move { inner.execute(&prompt, &model, &tools_owned).await }),
            )
            .await
    }

    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        frame_tx: mpsc::Sender<StreamFrame>,
    ) -> Result<Vec<Message>, RuntimeError> {
        self.inner
            .execute_streaming(prompt, model, tools, frame_tx)
            .await
    }

    async fn execute_multiple(
        &self,
        prompt: &Prompt,
        model: &str,
        tools: &[ToolDescriptor],
        n: u32,
    ) -> Result<Vec<Vec<Message>>, RuntimeError> {
        self.inner.execute_multiple(prompt, model, tools, n).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::llm::MockPromptExecutor;
    use crate::message::ResponseMeta;

    fn prompt_at(seconds: i64) -> Prompt {
        let clock = Arc::new(FixedClock::at_epoch());
        clock.advance(chrono::Duration::seconds(seconds));
        crate::prompt::PromptBuilder::new("p", clock)
            .system("rules")
            .user("hi")
            .build()
    }

    /// **Scenario**: Prompts differing only in message timestamps share a key.
    #[test]
    fn key_invariant_under_timestamps() {
        let a = prompt_at(0);
        let b = prompt_at(3600);
        assert_ne!(a.messages[0].timestamp(), b.messages[0].timestamp());
        assert_eq!(cache_key(&a, &[]), cache_key(&b, &[]));
    }

    /// **Scenario**: Different content or tools produce different keys.
    #[test]
    fn key_varies_with_content() {
        let a = prompt_at(0);
        let mut b = prompt_at(0);
        b.messages.push(Message::user(
            "more",
            chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        ));
        assert_ne!(cache_key(&a, &[]), cache_key(&b, &[]));

        let tool = ToolDescriptor::new("eval", "evaluates");
        assert_ne!(cache_key(&a, &[]), cache_key(&a, &[tool]));
    }

    /// **Scenario**: base36 rendering uses 0-9a-z.
    #[test]
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        let key = cache_key(&prompt_at(0), &[]);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    /// **Scenario**: CachingExecutor serves repeats from the cache; the
    /// provider sees one call.
    #[tokio::test]
    async fn caching_executor_hits() {
        let clock = Arc::new(FixedClock::at_epoch());
        let mock = Arc::new(MockPromptExecutor::new(clock.clone()));
        mock.push_response(vec![Message::assistant(
            "cached",
            ResponseMeta::at(clock.now()),
        )]);
        let cache = Arc::new(InMemoryPromptCache::new(clock.clone()));
        let executor = CachingExecutor::new(mock.clone(), cache);

        let prompt = prompt_at(0);
        let first = executor.execute(&prompt, "m", &[]).await.unwrap();
        let second = executor.execute(&prompt, "m", &[]).await.unwrap();
        assert_eq!(first[0].content(), "cached");
        assert_eq!(second[0].content(), "cached");
        assert_eq!(mock.call_count(), 1, "second call served from cache");
    }
}
