//! Single-generation backup record.
//!
//! One `lastBackup` key holds `{timestamp, compressed, state}`. The state is
//! stored inline (groups carry their items, no chunk refs), through the chunk
//! codec when compression is enabled and pays off. Every save overwrites it
//! with the model as it stood before that save, or removes it when that
//! model cannot be written, so it is never more than one save behind.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{Value, json};

use crate::backend::{KvBackend, entry_size};
use crate::codec;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::json_ext::JsonExt;
use crate::keys::BACKUP_KEY;
use crate::model::StateSnapshot;
use crate::validate::sanitize_inline_snapshot;

/// A backup as read from or written to `lastBackup`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Backup {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub state: StateSnapshot,
}

impl Backup {
    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Overwrite the backup record with `state`.
pub(crate) async fn write_backup(
    backend: &dyn KvBackend,
    state: &StateSnapshot,
    config: &StorageConfig,
) -> Result<Backup, StorageError> {
    let backup = Backup {
        timestamp: Utc::now().timestamp_millis(),
        state: state.clone(),
    };
    let (stored, compressed) = encode_state(serde_json::to_value(&backup.state)?, config);
    backend
        .set(
            BACKUP_KEY,
            json!({"timestamp": backup.timestamp, "compressed": compressed, "state": stored}),
        )
        .await?;
    debug!(
        "backup written ({} groups, compressed: {})",
        backup.state.groups.len(),
        compressed
    );
    Ok(backup)
}

/// The state as stored, encoded when that is enabled and smaller.
fn encode_state(raw: Value, config: &StorageConfig) -> (Value, bool) {
    if !config.compression_enabled() {
        return (raw, false);
    }
    match codec::encode(&raw, config.compression_level()) {
        Ok(text) => {
            let encoded = Value::String(text);
            if entry_size(BACKUP_KEY, &encoded) < entry_size(BACKUP_KEY, &raw) {
                (encoded, true)
            } else {
                (raw, false)
            }
        }
        Err(e) => {
            warn!("backup compression failed, storing it raw: {}", e);
            (raw, false)
        }
    }
}

/// Best-effort backup ahead of a save.
///
/// Failures are logged and swallowed, and the previous record is removed.
pub(crate) async fn snapshot(backend: &dyn KvBackend, state: &StateSnapshot, config: &StorageConfig) {
    let Err(e) = write_backup(backend, state, config).await else {
        return;
    };
    warn!("backup failed, dropping the older one: {}", e);
    if let Err(e) = backend.remove(&[BACKUP_KEY.to_string()]).await {
        warn!("could not remove the older backup: {}", e);
    }
}

/// Read the backup record.
///
/// A record whose `state` is missing, does not decode, or is not an object,
/// or one that cannot be parsed at all, counts as no backup. Damaged groups
/// and items inside the state are sanitized away.
pub(crate) async fn read_backup(backend: &dyn KvBackend) -> Result<Option<Backup>, StorageError> {
    let raw = match backend.get(BACKUP_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(None),
        Err(StorageError::Serialization(e)) => {
            warn!("backup record is unreadable, ignoring it: {}", e);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    Ok(parse_backup(&raw))
}

fn parse_backup(raw: &Value) -> Option<Backup> {
    let compressed = raw.get_bool("compressed").unwrap_or(false);
    let state = match raw.get("state").map(|s| codec::read_stored(s.clone(), compressed)) {
        Some(Ok(state)) if state.is_object() => state,
        Some(Err(e)) => {
            warn!("backup state does not decode, ignoring it: {}", e);
            return None;
        }
        _ => {
            warn!("backup record has no state, ignoring it");
            return None;
        }
    };
    let (state, sanitized) = sanitize_inline_snapshot(&state);
    if sanitized > 0 {
        warn!("backup contained {} damaged groups or items", sanitized);
    }
    Some(Backup {
        timestamp: raw.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
        state,
    })
}

/// Backup timestamp without decoding the state, for diagnostics.
pub(crate) async fn backup_timestamp(backend: &dyn KvBackend) -> Result<Option<i64>, StorageError> {
    match backend.get(BACKUP_KEY).await {
        Ok(raw) => Ok(raw
            .filter(|r| r.get("state").is_some_and(|s| s.is_object() || s.is_string()))
            .map(|r| r.get("timestamp").and_then(Value::as_i64).unwrap_or(0))),
        Err(StorageError::Serialization(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
