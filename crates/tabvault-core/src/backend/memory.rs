//! In-process backend.
//!
//! Mirrors the semantics of a browser sync store: per-key and total limits,
//! batch writes that fail as a whole. Useful for embedding without a disk and
//! for exercising the store's recovery paths.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{BoxFuture, KvBackend, StorageLimits, check_write, entry_size};
use crate::error::StorageError;

/// Map-backed storage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<Map<String, Value>>,
    limits: StorageLimits,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    /// Empty store with the default browser sync limits.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: StorageLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Store a value without any limit checks.
    ///
    /// Lets callers seed legacy or damaged data that a real store may hold.
    pub async fn insert_raw(&self, key: &str, value: Value) {
        self.entries.lock().await.insert(key.to_string(), value);
    }

    /// Drop a key without going through the trait.
    pub async fn remove_raw(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.remove(key)
    }

    /// Make every operation fail with [`StorageError::Unavailable`] until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory backend switched off".into()));
        }
        Ok(())
    }
}

impl KvBackend for MemoryBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StorageError>> {
        Box::pin(async move {
            self.ensure_available()?;
            Ok(self.entries.lock().await.get(key).cloned())
        })
    }

    fn set_many<'a>(&'a self, entries: Map<String, Value>) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.ensure_available()?;
            let mut current = self.entries.lock().await;
            check_write(self.limits, &current, &entries)?;
            current.extend(entries);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.ensure_available()?;
            let mut current = self.entries.lock().await;
            for key in keys {
                current.remove(key);
            }
            Ok(())
        })
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Map<String, Value>, StorageError>> {
        Box::pin(async move {
            self.ensure_available()?;
            Ok(self.entries.lock().await.clone())
        })
    }

    fn bytes_in_use(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            self.ensure_available()?;
            Ok(self
                .entries
                .lock()
                .await
                .iter()
                .map(|(k, v)| entry_size(k, v))
                .sum())
        })
    }

    fn limits(&self) -> StorageLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let backend = MemoryBackend::new();
        backend.set("a", json!(1)).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), Some(json!(1)));
        backend.remove(&["a".to_string(), "missing".to_string()]).await.unwrap();
        assert_eq!(backend.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_batch_writes_nothing() {
        let backend = MemoryBackend::with_limits(StorageLimits {
            max_bytes_per_item: 16,
            total_quota_bytes: 1000,
        });
        let mut batch = Map::new();
        batch.insert("small".into(), json!(1));
        batch.insert("big".into(), json!("x".repeat(40)));
        assert!(matches!(
            backend.set_many(batch).await,
            Err(StorageError::ItemTooLarge { .. })
        ));
        assert!(backend.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bytes_in_use() {
        let backend = MemoryBackend::new();
        backend.set("k", json!([1, 2])).await.unwrap();
        backend.set("chunkCount", json!(3)).await.unwrap();
        assert_eq!(backend.bytes_in_use().await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = MemoryBackend::new();
        backend.insert_raw("a", json!(1)).await;
        backend.set_unavailable(true);
        assert!(matches!(
            backend.get("a").await,
            Err(StorageError::Unavailable(_))
        ));
        backend.set_unavailable(false);
        assert_eq!(backend.get("a").await.unwrap(), Some(json!(1)));
    }
}
