//! In-memory prompt cache with miss coalescing.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::message::Message;

use super::PromptCache;

/// Cache entries are once-cells so concurrent misses on one key run the
/// underlying computation exactly once and share the result.
pub struct InMemoryPromptCache {
    entries: DashMap<String, Arc<OnceCell<Vec<Message>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryPromptCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep copy with every response timestamp rewritten to now; content,
    /// usage, and finish reasons are untouched.
    fn rewrite_times(&self, responses: &[Message]) -> Vec<Message> {
        let now = self.clock.now();
        responses
            .iter()
            .cloned()
            .map(|mut message| {
                if let Some(meta) = message.response_meta_mut() {
                    meta.timestamp = now;
                }
                message
            })
            .collect()
    }
}

#[async_trait]
impl PromptCache for InMemoryPromptCache {
    async fn get(&self, key: &str) -> Option<Vec<Message>> {
        let cell = self.entries.get(key)?.clone();
        cell.get().map(|responses| self.rewrite_times(responses))
    }

    async fn put(&self, key: &str, responses: Vec<Message>) {
        self.entries.insert(
            key.to_string(),
            Arc::new(OnceCell::new_with(Some(responses))),
        );
    }

    async fn get_or_compute(
        &self,
        key: &str,
        compute: BoxFuture<'_, Result<Vec<Message>, RuntimeError>>,
    ) -> Result<Vec<Message>, RuntimeError> {
        let cell = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        match cell.get_or_try_init(|| compute).await {
            Ok(responses) => Ok(self.rewrite_times(responses)),
            Err(err) => {
                // Leave no poisoned slot behind; the next caller retries.
                if cell.get().is_none() {
                    self.entries.remove(key);
                }
                Err(err)
            }
        }
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::message::ResponseMeta;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::at_epoch())
    }

    fn assistant_at(content: &str, seconds: i64) -> Message {
        let at = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH + chrono::Duration::seconds(seconds);
        Message::assistant(content, ResponseMeta::at(at))
    }

    /// **Scenario**: A hit rewrites only the response timestamp, not content.
    #[tokio::test]
    async fn hit_rewrites_timestamp_only() {
        let clock = fixed_clock();
        let cache = InMemoryPromptCache::new(clock.clone());
        cache.put("k", vec![assistant_at("answer", 5)]).await;

        clock.advance(chrono::Duration::seconds(100));
        let got = cache.get("k").await.unwrap();
        assert_eq!(got[0].content(), "answer");
        assert_eq!(got[0].timestamp(), clock.now());
    }

    /// **Scenario**: Concurrent misses on one key coalesce into a single
    /// computation.
    #[tokio::test]
    async fn misses_coalesce() {
        let cache = Arc::new(InMemoryPromptCache::new(fixed_clock()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(
                        "shared",
                        Box::pin(async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(vec![assistant_at("once", 0)])
                        }),
                    )
                    .await
            }));
        }
        for h in handles {
            let responses = h.await.unwrap().unwrap();
            assert_eq!(responses[0].content(), "once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one computation");
    }

    /// **Scenario**: A failed computation is not cached; the next caller
    /// retries.
    #[tokio::test]
    async fn failure_not_cached() {
        let cache = InMemoryPromptCache::new(fixed_clock());
        let err = cache
            .get_or_compute(
                "k",
                Box::pin(async { Err(RuntimeError::LlmTransport("boom".into())) }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "LlmTransport");
        assert!(cache.is_empty());

        let ok = cache
            .get_or_compute("k", Box::pin(async { Ok(vec![assistant_at("retry", 0)]) }))
            .await
            .unwrap();
        assert_eq!(ok[0].content(), "retry");
    }
}
