//! Directory backend.
//!
//! Each key is a `<key>.json` file under a root directory (typically
//! `~/.tabvault/store/`). Values are written with
//! [`safe_io::atomic_write`](crate::safe_io::atomic_write), and the same
//! per-key and quota limits as the browser store are enforced so data written
//! here can be exported and synced elsewhere unchanged.
//!
//! A batch is checked against the limits before any file is touched. An I/O
//! failure part-way through a batch can still leave some files written; the
//! store's read path repairs that.

use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;

use super::{BoxFuture, KvBackend, StorageLimits, check_write, entry_size};
use crate::error::StorageError;

const VALUE_EXTENSION: &str = "json";

/// Filesystem-backed key-value storage.
pub struct LocalBackend {
    root: PathBuf,
    limits: StorageLimits,
    /// Serializes batch writes so the limit check and the write see the same
    /// state.
    write_lock: Mutex<()>,
}

impl LocalBackend {
    /// Create a backend rooted at the given directory with default limits.
    pub fn new(root: PathBuf) -> Self {
        Self::with_limits(root, StorageLimits::default())
    }

    pub fn with_limits(root: PathBuf, limits: StorageLimits) -> Self {
        Self {
            root,
            limits,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its file. Keys are restricted to characters that cannot
    /// escape the root directory.
    fn value_path(&self, key: &str) -> io::Result<PathBuf> {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key '{}'", key),
            ));
        }
        Ok(self.root.join(format!("{key}.{VALUE_EXTENSION}")))
    }

    async fn read_value(path: &Path) -> Result<Option<Value>, StorageError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Keys present on disk, with their file paths.
    async fn list(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
        let mut found = Vec::new();
        if fs::metadata(&self.root).await.is_err() {
            return Ok(found);
        }
        let mut read_dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            found.push((key, path));
        }
        Ok(found)
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        let mut entries = Map::new();
        for (key, path) in self.list().await? {
            match Self::read_value(&path).await {
                Ok(Some(value)) => {
                    entries.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => warn!("{}: skipping unreadable value: {}", path.display(), e),
            }
        }
        Ok(entries)
    }
}

impl KvBackend for LocalBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StorageError>> {
        Box::pin(async move { Self::read_value(&self.value_path(key)?).await })
    }

    fn set_many<'a>(&'a self, entries: Map<String, Value>) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let current = self.read_all().await?;
            check_write(self.limits, &current, &entries)?;

            for (key, value) in entries {
                let path = self.value_path(&key)?;
                let bytes = serde_json::to_vec(&value)?;
                // atomic_write blocks on fsync
                tokio::task::spawn_blocking(move || crate::safe_io::atomic_write(&path, &bytes))
                    .await
                    .map_err(|e| io::Error::other(format!("join error: {}", e)))??;
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            for key in keys {
                match fs::remove_file(self.value_path(key)?).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
    }

    fn get_all(&self) -> BoxFuture<'_, Result<Map<String, Value>, StorageError>> {
        Box::pin(self.read_all())
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        Box::pin(async move { Ok(self.list().await?.into_iter().map(|(key, _)| key).collect()) })
    }

    fn bytes_in_use(&self) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            let entries = self.read_all().await?;
            Ok(entries.iter().map(|(k, v)| entry_size(k, v)).sum())
        })
    }

    fn limits(&self) -> StorageLimits {
        self.limits
    }
}
