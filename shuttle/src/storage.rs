//! Per-run scratchpad: type-tagged heterogeneous key map.
//!
//! Keys carry their value type ([`StorageKey<T>`]); the map is guarded by a
//! single mutex and is safe under concurrent access from node executions on
//! the same context. Reading a key whose stored value has a different type
//! is a programmer error and panics with a typed-cast message.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

/// Error from the required-read path.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key not found: {0}")]
    NotFound(String),
}

/// Typed key into the scratchpad. The name does not need to be globally
/// unique, but reusing a name with a different `T` will panic on read.
pub struct StorageKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageKey<T> {}

type AnyValue = Arc<dyn Any + Send + Sync>;

/// Mutex-guarded heterogeneous map; one per run context.
#[derive(Default)]
pub struct KeyValueStorage {
    inner: Mutex<HashMap<String, AnyValue>>,
}

impl KeyValueStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the value, or None when absent.
    ///
    /// Panics if the stored value has a different type than `T`.
    pub async fn get<T>(&self, key: StorageKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let guard = self.inner.lock().await;
        guard.get(key.name).map(|v| Self::cast(key.name, v))
    }

    /// Like [`get`](Self::get) but absence is an error.
    pub async fn get_value<T>(&self, key: StorageKey<T>) -> Result<T, StorageError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get(key)
            .await
            .ok_or_else(|| StorageError::NotFound(key.name.to_string()))
    }

    pub async fn set<T>(&self, key: StorageKey<T>, value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut guard = self.inner.lock().await;
        guard.insert(key.name.to_string(), Arc::new(value));
    }

    /// Removes the value, returning it when present.
    pub async fn remove<T>(&self, key: StorageKey<T>) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut guard = self.inner.lock().await;
        guard.remove(key.name).map(|v| Self::cast(key.name, &v))
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        guard.clear();
    }

    /// Snapshot of the raw map (values remain type-erased).
    pub async fn to_map(&self) -> HashMap<String, AnyValue> {
        let guard = self.inner.lock().await;
        guard.clone()
    }

    /// Bulk insert of type-erased entries (e.g. a snapshot from `to_map`).
    pub async fn put_all(&self, entries: HashMap<String, AnyValue>) {
        let mut guard = self.inner.lock().await;
        guard.extend(entries);
    }

    fn cast<T>(name: &str, value: &AnyValue) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        value
            .downcast_ref::<T>()
            .unwrap_or_else(|| {
                panic!(
                    "storage key {:?} read with type {} but holds a different type",
                    name,
                    std::any::type_name::<T>()
                )
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: StorageKey<u32> = StorageKey::new("counter");
    const LABEL: StorageKey<String> = StorageKey::new("label");

    /// **Scenario**: set/get/remove round-trip typed values.
    #[tokio::test]
    async fn set_get_remove() {
        let storage = KeyValueStorage::new();
        assert_eq!(storage.get(COUNTER).await, None);
        storage.set(COUNTER, 7).await;
        assert_eq!(storage.get(COUNTER).await, Some(7));
        assert_eq!(storage.remove(COUNTER).await, Some(7));
        assert_eq!(storage.get(COUNTER).await, None);
    }

    /// **Scenario**: get_value surfaces NotFound for missing keys.
    #[tokio::test]
    async fn get_value_not_found() {
        let storage = KeyValueStorage::new();
        let err = storage.get_value(LABEL).await.unwrap_err();
        assert!(err.to_string().contains("label"));
        storage.set(LABEL, "x".to_string()).await;
        assert_eq!(storage.get_value(LABEL).await.unwrap(), "x");
    }

    /// **Scenario**: Same name with a different type panics on read (programmer error).
    #[tokio::test]
    #[should_panic(expected = "different type")]
    async fn type_mismatch_panics() {
        let storage = KeyValueStorage::new();
        storage.set(StorageKey::<u32>::new("shared"), 1).await;
        let _ = storage.get(StorageKey::<String>::new("shared")).await;
    }

    /// **Scenario**: to_map/put_all transfer entries between storages.
    #[tokio::test]
    async fn snapshot_transfer() {
        let a = KeyValueStorage::new();
        a.set(COUNTER, 3).await;
        a.set(LABEL, "tag".to_string()).await;
        let b = KeyValueStorage::new();
        b.put_all(a.to_map().await).await;
        assert_eq!(b.get(COUNTER).await, Some(3));
        assert_eq!(b.get(LABEL).await, Some("tag".to_string()));
        b.clear().await;
        assert!(b.to_map().await.is_empty());
    }

    /// **Scenario**: Concurrent writers serialize through the mutex without loss.
    #[tokio::test]
    async fn concurrent_access() {
        let storage = Arc::new(KeyValueStorage::new());
        let mut handles = Vec::new();
        for i in 0..16u32 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                storage.set(StorageKey::<u32>::new("last"), i).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(storage.get(StorageKey::<u32>::new("last")).await.is_some());
    }
}
