//! Key-value backend: the storage abstraction.
//!
//! Backends are intentionally simple: string keys, JSON values, a per-key
//! byte limit and a total quota. Chunking, compression and recovery live in
//! the store, which only talks to a backend through [`KvBackend`].
//!
//! # Dyn-compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of `impl Future` so that
//! `Arc<dyn KvBackend>` works and the store can be handed any backend at
//! runtime.
//!
//! # Size accounting
//!
//! An entry costs the byte length of its key plus the byte length of its
//! compact JSON value. Every backend enforces the same rules through
//! [`check_write`]: a batch is rejected as a whole if one entry is over the
//! per-key limit or if the resulting total is over the quota.

pub mod local;
pub mod memory;

use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::error::StorageError;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Boxed, Send future: the return type for all backend methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-key limit of a browser sync store.
pub const DEFAULT_MAX_BYTES_PER_ITEM: usize = 8192;

/// Total quota of a browser sync store.
pub const DEFAULT_TOTAL_QUOTA_BYTES: usize = 102_400;

/// Hard limits imposed by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub max_bytes_per_item: usize,
    pub total_quota_bytes: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_bytes_per_item: DEFAULT_MAX_BYTES_PER_ITEM,
            total_quota_bytes: DEFAULT_TOTAL_QUOTA_BYTES,
        }
    }
}

/// Key-value storage with per-key and total byte limits.
///
/// All methods are async (returning boxed futures) to accommodate
/// network-backed implementations and dyn-compatibility.
pub trait KvBackend: Send + Sync {
    /// Read one value. Missing keys are `Ok(None)`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StorageError>>;

    /// Write a batch of entries. Either every entry is written or none is.
    fn set_many<'a>(&'a self, entries: Map<String, Value>) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Remove keys. Missing keys are ignored.
    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Read every stored entry.
    fn get_all(&self) -> BoxFuture<'_, Result<Map<String, Value>, StorageError>>;

    /// Every stored key, including keys whose value no longer parses.
    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        Box::pin(async move { Ok(self.get_all().await?.keys().cloned().collect()) })
    }

    /// Total bytes currently in use, per the size accounting rules.
    fn bytes_in_use(&self) -> BoxFuture<'_, Result<usize, StorageError>>;

    /// The limits this backend enforces.
    fn limits(&self) -> StorageLimits;

    /// Write a single entry.
    fn set<'a>(&'a self, key: &'a str, value: Value) -> BoxFuture<'a, Result<(), StorageError>> {
        let mut entries = Map::new();
        entries.insert(key.to_string(), value);
        self.set_many(entries)
    }
}

/// Bytes an entry costs against the limits.
pub fn entry_size(key: &str, value: &Value) -> usize {
    // Serializing a `Value` cannot fail.
    key.len() + serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

/// Validate a batch against the limits.
///
/// `current` is the existing store; entries being overwritten are replaced in
/// the total rather than counted twice.
pub fn check_write(
    limits: StorageLimits,
    current: &Map<String, Value>,
    entries: &Map<String, Value>,
) -> Result<(), StorageError> {
    let mut total: usize = current
        .iter()
        .filter(|(k, _)| !entries.contains_key(*k))
        .map(|(k, v)| entry_size(k, v))
        .sum();

    for (key, value) in entries {
        let size = entry_size(key, value);
        if size > limits.max_bytes_per_item {
            return Err(StorageError::ItemTooLarge {
                key: key.clone(),
                size,
                limit: limits.max_bytes_per_item,
            });
        }
        total += size;
    }

    if total > limits.total_quota_bytes {
        return Err(StorageError::QuotaExceeded {
            needed: total,
            quota: limits.total_quota_bytes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_entry_size() {
        // "k" + "[1,2]"
        assert_eq!(entry_size("k", &json!([1, 2])), 6);
        assert_eq!(entry_size("chunkCount", &json!(3)), 11);
    }

    #[test]
    fn test_check_write_per_item_limit() {
        let limits = StorageLimits {
            max_bytes_per_item: 10,
            total_quota_bytes: 1000,
        };
        let err = check_write(limits, &Map::new(), &map(&[("key", json!("0123456789"))]))
            .unwrap_err();
        assert!(matches!(err, StorageError::ItemTooLarge { size: 15, .. }));
    }

    #[test]
    fn test_check_write_quota_counts_overwrites_once() {
        let limits = StorageLimits {
            max_bytes_per_item: 100,
            total_quota_bytes: 20,
        };
        let current = map(&[("a", json!("12345678"))]); // 11 bytes
        // overwriting `a` with a same-size value fits
        assert!(check_write(limits, &current, &map(&[("a", json!("87654321"))])).is_ok());
        // adding a second entry does not
        let err = check_write(limits, &current, &map(&[("b", json!("12345678"))])).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 22, quota: 20 }));
    }
}
