//! The state store: one owned model, persisted as chunks.
//!
//! [`StateStore`] owns the in-memory [`StateSnapshot`] and a handle to a
//! [`KvBackend`]. Every operation takes the store's async mutex for its whole
//! duration, so a load can never observe a save half-way through its
//! delete-then-write sequence.
//!
//! # Load states
//!
//! ```text
//! Uninitialized -> Loading -> Clean               index and chunks intact
//!                          -> Repaired            something sanitized, re-saved
//!                          -> RecoveredFromBackup index unusable, backup restored
//!                          -> EmptyInitialized    index unusable, no backup
//!                          -> Failed              backend error; empty state persisted
//! ```

mod backup;
pub(crate) mod loader;
mod writer;


use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backend::KvBackend;
use crate::config::StorageConfig;
use crate::error::{ImportError, StorageError};
use crate::import::{self, ImportSummary};
use crate::model::StateSnapshot;
use crate::status::{self, DiagnosticsReport};

pub use backup::Backup;
pub(crate) use backup::backup_timestamp;

use loader::IndexRead;

/// Where the store is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Uninitialized,
    Loading,
    Clean,
    Repaired,
    RecoveredFromBackup,
    EmptyInitialized,
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadPhase::Uninitialized => "uninitialized",
            LoadPhase::Loading => "loading",
            LoadPhase::Clean => "clean",
            LoadPhase::Repaired => "repaired",
            LoadPhase::RecoveredFromBackup => "recovered from backup",
            LoadPhase::EmptyInitialized => "empty (initialized)",
            LoadPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A fault recovered while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFault {
    /// The index was present but unusable.
    MalformedIndex(String),
    /// A chunk was missing, undecodable or not a sequence; read as empty.
    CorruptChunk { index: usize, reason: String },
    /// A non-object entry in the index group list; dropped.
    InvalidGroup { position: usize },
    /// A group header was missing fields that had to be synthesized.
    RepairedGroup { id: String },
    /// Chunk refs that were malformed or pointed past the chunk list.
    BadChunkRef { group_id: String, count: usize },
    /// Items that failed validation; dropped.
    InvalidItems { group_id: String, count: usize },
    /// `chunkCount` was missing, not a count, or past the chunks present.
    BadChunkCount { stored: String, used: usize },
}

impl fmt::Display for LoadFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFault::MalformedIndex(reason) => write!(f, "malformed index: {reason}"),
            LoadFault::CorruptChunk { index, reason } => write!(f, "chunk {index} corrupt: {reason}"),
            LoadFault::InvalidGroup { position } => write!(f, "group #{position} is not an object"),
            LoadFault::RepairedGroup { id } => write!(f, "group {id}: header repaired"),
            LoadFault::BadChunkRef { group_id, count } => {
                write!(f, "group {group_id}: {count} bad chunk refs")
            }
            LoadFault::InvalidItems { group_id, count } => {
                write!(f, "group {group_id}: {count} invalid items dropped")
            }
            LoadFault::BadChunkCount { stored, used } => {
                write!(f, "chunkCount {stored} is unusable, read {used} chunks")
            }
        }
    }
}

/// Result of [`StateStore::load`].
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub snapshot: StateSnapshot,
    pub phase: LoadPhase,
    pub faults: Vec<LoadFault>,
}

/// Result of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub chunks: usize,
    pub compressed: bool,
    /// Items left out because they had an empty url or title.
    pub skipped_items: usize,
    /// Single-item chunks holding an item at or over the chunk ceiling.
    pub oversize_chunks: usize,
}

struct Inner {
    snapshot: StateSnapshot,
    phase: LoadPhase,
}

/// Owner of the model and its persisted form.
pub struct StateStore {
    backend: Arc<dyn KvBackend>,
    config: StorageConfig,
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Create a store with an empty model. Nothing is read until
    /// [`load`](Self::load).
    pub fn new(backend: Arc<dyn KvBackend>, config: StorageConfig) -> Self {
        Self {
            backend,
            config,
            inner: Mutex::new(Inner {
                snapshot: StateSnapshot::default(),
                phase: LoadPhase::Uninitialized,
            }),
        }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Copy of the current model.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn phase(&self) -> LoadPhase {
        self.inner.lock().await.phase
    }

    /// Load the model from the backend.
    ///
    /// Never fails: backend errors end in [`LoadPhase::Failed`] with an empty
    /// model, which is also persisted so the backend holds a readable root.
    pub async fn load(&self) -> LoadReport {
        let mut inner = self.inner.lock().await;
        inner.phase = LoadPhase::Loading;

        match self.load_locked(&mut inner).await {
            Ok(report) => {
                info!("loaded {} groups ({})", report.snapshot.groups.len(), report.phase);
                report
            }
            Err(e) => {
                error!("load failed, resetting to an empty state: {}", e);
                inner.snapshot = StateSnapshot::default();
                inner.phase = LoadPhase::Failed;
                if let Err(e) =
                    writer::write_chunked(self.backend.as_ref(), &inner.snapshot, &self.config).await
                {
                    error!("could not persist the empty state: {}", e);
                }
                LoadReport {
                    snapshot: StateSnapshot::default(),
                    phase: LoadPhase::Failed,
                    faults: Vec::new(),
                }
            }
        }
    }

    async fn load_locked(&self, inner: &mut Inner) -> Result<LoadReport, StorageError> {
        let backend = self.backend.as_ref();
        let mut faults = Vec::new();

        let (index, compressed) = match loader::read_index(backend).await? {
            IndexRead::Valid { index, compressed } => (index, compressed),
            read => {
                if let IndexRead::Invalid(reason) = read {
                    warn!("stored index is unusable: {}", reason);
                    faults.push(LoadFault::MalformedIndex(reason));
                }
                return self.load_without_index(inner, faults).await;
            }
        };

        let (count, count_fault) = loader::chunk_count(backend).await?;
        faults.extend(count_fault);
        let (chunks, chunk_faults) = loader::read_chunks(backend, count, compressed).await;
        let (snapshot, group_faults) = loader::rehydrate(&index, &chunks);
        faults.extend(chunk_faults);
        faults.extend(group_faults);

        inner.snapshot = snapshot;
        inner.phase = if faults.is_empty() {
            LoadPhase::Clean
        } else {
            warn!("recovered {} faults while loading, re-saving", faults.len());
            self.persist(&inner.snapshot, &inner.snapshot).await?;
            LoadPhase::Repaired
        };

        Ok(LoadReport {
            snapshot: inner.snapshot.clone(),
            phase: inner.phase,
            faults,
        })
    }

    async fn load_without_index(
        &self,
        inner: &mut Inner,
        faults: Vec<LoadFault>,
    ) -> Result<LoadReport, StorageError> {
        match backup::read_backup(self.backend.as_ref()).await? {
            Some(found) => {
                info!("restoring backup from {}", found.timestamp);
                inner.snapshot = found.state;
                self.persist(&inner.snapshot, &inner.snapshot).await?;
                inner.phase = LoadPhase::RecoveredFromBackup;
            }
            None => {
                debug!("no index and no backup, starting empty");
                inner.snapshot = StateSnapshot::default();
                writer::write_chunked(self.backend.as_ref(), &inner.snapshot, &self.config).await?;
                inner.phase = LoadPhase::EmptyInitialized;
            }
        }
        Ok(LoadReport {
            snapshot: inner.snapshot.clone(),
            phase: inner.phase,
            faults,
        })
    }

    /// Replace the model with `next` and persist it.
    ///
    /// The model as it stood before the call is written to the backup first.
    /// On error `next` stays installed in memory.
    pub async fn save(&self, next: StateSnapshot) -> Result<SaveReport, StorageError> {
        let mut inner = self.inner.lock().await;
        let previous = std::mem::replace(&mut inner.snapshot, next);
        self.persist(&previous, &inner.snapshot).await
    }

    /// Apply `f` to a copy of the model, then save the result.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut StateSnapshot) -> T,
    {
        let mut inner = self.inner.lock().await;
        let mut next = inner.snapshot.clone();
        let out = f(&mut next);
        let previous = std::mem::replace(&mut inner.snapshot, next);
        self.persist(&previous, &inner.snapshot).await?;
        Ok(out)
    }

    /// Replace the model wholesale with normalized external data.
    pub async fn import_external(&self, payload: &Value) -> Result<ImportSummary, ImportError> {
        let (next, summary) = import::normalize(payload)?;
        let mut inner = self.inner.lock().await;
        let previous = std::mem::replace(&mut inner.snapshot, next);
        self.persist(&previous, &inner.snapshot).await?;
        info!("imported {} groups with {} items", summary.groups, summary.items);
        Ok(summary)
    }

    /// Audit the stored data without changing it.
    pub async fn check_status(&self) -> Result<DiagnosticsReport, StorageError> {
        let _inner = self.inner.lock().await;
        status::audit(self.backend.as_ref()).await
    }

    /// Back up the current model now. Unlike the backup taken by a save,
    /// failure is reported.
    pub async fn create_backup(&self) -> Result<Backup, StorageError> {
        let inner = self.inner.lock().await;
        backup::write_backup(self.backend.as_ref(), &inner.snapshot, &self.config).await
    }

    /// Install the backed-up state and persist it. Returns `false` when no
    /// backup exists.
    pub async fn restore_from_backup(&self) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().await;
        let Some(found) = backup::read_backup(self.backend.as_ref()).await? else {
            return Ok(false);
        };
        inner.snapshot = found.state;
        self.persist(&inner.snapshot, &inner.snapshot).await?;
        info!("restored backup from {}", found.timestamp);
        Ok(true)
    }

    /// Remove every stored key, backup included, and persist an empty model.
    /// Returns the number of keys removed.
    pub async fn clear(&self) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock().await;
        let backend = self.backend.as_ref();
        let keys: Vec<String> = backend.get_all().await?.keys().cloned().collect();
        backend.remove(&keys).await?;
        inner.snapshot = StateSnapshot::default();
        writer::write_chunked(backend, &inner.snapshot, &self.config).await?;
        info!("cleared {} keys", keys.len());
        Ok(keys.len())
    }

    /// The model in the `{groups, searchQuery}` import format.
    pub async fn export(&self) -> Result<Value, StorageError> {
        let inner = self.inner.lock().await;
        Ok(serde_json::to_value(&inner.snapshot)?)
    }

    /// Back up `previous` (best-effort), then write `next` as chunks.
    async fn persist(
        &self,
        previous: &StateSnapshot,
        next: &StateSnapshot,
    ) -> Result<SaveReport, StorageError> {
        let started = Utc::now();
        backup::snapshot(self.backend.as_ref(), previous, &self.config).await;
        let report = writer::write_chunked(self.backend.as_ref(), next, &self.config).await?;
        debug!(
            "persisted in {} ms",
            (Utc::now() - started).num_milliseconds()
        );
        Ok(report)
    }
}
