//! Read path: index, chunks and group reconstruction.
//!
//! Every fault below the index is recovered here. A chunk that is missing,
//! fails to decode or is not a sequence reads as empty; a chunk ref that
//! points nowhere resolves to nothing; items that fail validation are
//! dropped. Each recovery is recorded as a [`LoadFault`] so the store can
//! decide to re-save.

use log::warn;
use serde_json::Value;

use crate::backend::{KvBackend, StorageLimits};
use crate::codec;
use crate::error::StorageError;
use crate::json_ext::JsonExt;
use crate::keys::{CHUNK_COUNT_KEY, COMPRESSED_FLAG_KEY, MAIN_INDEX_KEY, chunk_key, parse_chunk_key};
use crate::model::StateSnapshot;
use crate::validate::{group_header, parse_item};

use super::LoadFault;

/// Outcome of reading `mainIndex`.
#[derive(Debug)]
pub(crate) enum IndexRead {
    Missing,
    /// Present but unusable; the reason is for logs and the load report.
    Invalid(String),
    Valid { index: Value, compressed: bool },
}

/// Read and decode the stored index.
///
/// Only backend failures are errors. An index file that does not parse is
/// reported as [`IndexRead::Invalid`].
pub(crate) async fn read_index(backend: &dyn KvBackend) -> Result<IndexRead, StorageError> {
    let compressed = backend
        .get(COMPRESSED_FLAG_KEY)
        .await?
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let raw = match backend.get(MAIN_INDEX_KEY).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(IndexRead::Missing),
        Err(StorageError::Serialization(e)) => return Ok(IndexRead::Invalid(e.to_string())),
        Err(e) => return Err(e),
    };

    let index = match codec::read_stored(raw, compressed) {
        Ok(index) => index,
        Err(e) => return Ok(IndexRead::Invalid(e.to_string())),
    };
    if index.get_array("groups").is_none() {
        return Ok(IndexRead::Invalid("groups is not a sequence".to_string()));
    }
    Ok(IndexRead::Valid { index, compressed })
}

/// Number of chunks to read.
///
/// The stored `chunkCount` is used only when it is a count no larger than the
/// highest `chunk_<n>` key present plus one. Otherwise that bound is read
/// instead and the stored value is reported as [`LoadFault::BadChunkCount`].
pub(crate) async fn chunk_count(
    backend: &dyn KvBackend,
) -> Result<(usize, Option<LoadFault>), StorageError> {
    let present = backend
        .keys()
        .await?
        .iter()
        .filter_map(|k| parse_chunk_key(k))
        .max()
        .map_or(0, |i| i.saturating_add(1))
        .min(max_chunks(backend.limits()));

    let stored = backend.get(CHUNK_COUNT_KEY).await?;
    match stored
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
    {
        Some(count) if count <= present => Ok((count, None)),
        _ => {
            let stored = stored.map_or_else(|| "missing".to_string(), |v| v.to_string());
            warn!(
                "chunkCount {} does not match the stored chunks, reading {}",
                stored, present
            );
            Ok((present, Some(LoadFault::BadChunkCount { stored, used: present })))
        }
    }
}

/// Upper bound on chunks a backend can hold: each one costs at least its
/// key plus `[]` against the quota.
fn max_chunks(limits: StorageLimits) -> usize {
    limits.total_quota_bytes / (chunk_key(0).len() + 2)
}

/// Read one chunk. `Err` carries the reason the chunk is unusable.
pub(crate) async fn read_chunk(
    backend: &dyn KvBackend,
    index: usize,
    compressed: bool,
) -> Result<Vec<Value>, String> {
    let raw = match backend.get(&chunk_key(index)).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Err("missing".to_string()),
        Err(e) => return Err(e.to_string()),
    };
    match codec::read_stored(raw, compressed) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err("not a sequence".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Read `chunk_0 .. chunk_{count-1}`. Unusable chunks become empty and are
/// reported as [`LoadFault::CorruptChunk`].
pub(crate) async fn read_chunks(
    backend: &dyn KvBackend,
    count: usize,
    compressed: bool,
) -> (Vec<Vec<Value>>, Vec<LoadFault>) {
    let mut chunks = Vec::with_capacity(count);
    let mut faults = Vec::new();
    for index in 0..count {
        match read_chunk(backend, index, compressed).await {
            Ok(items) => chunks.push(items),
            Err(reason) => {
                warn!("chunk {} is unreadable ({}), treating it as empty", index, reason);
                faults.push(LoadFault::CorruptChunk { index, reason });
                chunks.push(Vec::new());
            }
        }
    }
    (chunks, faults)
}

/// Rebuild the model from a decoded index and its chunks.
pub(crate) fn rehydrate(index: &Value, chunks: &[Vec<Value>]) -> (StateSnapshot, Vec<LoadFault>) {
    let mut faults = Vec::new();
    let mut groups = Vec::new();

    for (position, raw) in index
        .get_array("groups")
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
    {
        if !raw.is_object() {
            faults.push(LoadFault::InvalidGroup { position });
            continue;
        }
        let (mut group, repaired) = group_header(raw);
        if repaired {
            faults.push(LoadFault::RepairedGroup {
                id: group.id.clone(),
            });
        }

        let mut bad_refs = 0;
        let mut dropped = 0;
        for chunk_ref in raw.get_array("tabs").map(Vec::as_slice).unwrap_or_default() {
            let resolved = match (
                chunk_ref
                    .get_u64("chunkIndex")
                    .and_then(|i| usize::try_from(i).ok()),
                chunk_ref.get_u64("count"),
            ) {
                (Some(i), Some(count)) => chunks.get(i).map(|chunk| {
                    let count = usize::try_from(count).unwrap_or(usize::MAX);
                    &chunk[..chunk.len().min(count)]
                }),
                _ => None,
            };
            let Some(items) = resolved else {
                bad_refs += 1;
                continue;
            };
            for raw_item in items {
                match parse_item(raw_item) {
                    Some(item) => group.items.push(item),
                    None => dropped += 1,
                }
            }
        }

        if bad_refs > 0 {
            faults.push(LoadFault::BadChunkRef {
                group_id: group.id.clone(),
                count: bad_refs,
            });
        }
        if dropped > 0 {
            faults.push(LoadFault::InvalidItems {
                group_id: group.id.clone(),
                count: dropped,
            });
        }
        groups.push(group);
    }

    let snapshot = StateSnapshot {
        groups,
        search_query: index.get_str("searchQuery").unwrap_or_default().to_string(),
    };
    (snapshot, faults)
}
