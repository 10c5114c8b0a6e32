//! Chunked write path.
//!
//! Write order:
//! 1. delete every `chunk_<n>` present, committed or orphaned (indices are
//!    reused from 0)
//! 2. `mainIndex` and `isCompressed` together
//! 3. chunks, `write_batch_size` at a time
//! 4. `chunkCount`, the commit marker
//!
//! Nothing here is transactional. An interrupted write can leave a stale or
//! partial chunk set, which the loader repairs on the next read.

use futures_util::future::try_join_all;
use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::backend::KvBackend;
use crate::chunk::{ChunkedState, build_index};
use crate::codec;
use crate::config::StorageConfig;
use crate::error::{CodecError, StorageError};
use crate::keys::{CHUNK_COUNT_KEY, COMPRESSED_FLAG_KEY, MAIN_INDEX_KEY, chunk_key, parse_chunk_key};
use crate::model::StateSnapshot;

use super::SaveReport;

/// Index and chunk values ready for the backend.
struct EncodedState {
    index: Value,
    chunks: Vec<Value>,
    compressed: bool,
}

/// Persist a snapshot as index plus chunks. Does not touch the backup.
pub(crate) async fn write_chunked(
    backend: &dyn KvBackend,
    snapshot: &StateSnapshot,
    config: &StorageConfig,
) -> Result<SaveReport, StorageError> {
    let max_bytes_per_item = backend.limits().max_bytes_per_item;
    let chunked = build_index(snapshot, config.chunk_ceiling(max_bytes_per_item))?;
    let max_encoded = max_bytes_per_item
        .saturating_sub(config.safety_margin_bytes())
        .max(1);
    let encoded = encode_state(&chunked, config, max_encoded)?;

    let stale = stale_chunk_keys(backend).await?;
    if !stale.is_empty() {
        backend.remove(&stale).await?;
        debug!("removed {} stale chunks", stale.len());
    }

    let mut head = Map::new();
    head.insert(MAIN_INDEX_KEY.to_string(), encoded.index);
    head.insert(COMPRESSED_FLAG_KEY.to_string(), Value::Bool(encoded.compressed));
    backend.set_many(head).await?;

    let chunk_count = encoded.chunks.len();
    let batch_size = config.write_batch_size();
    let mut pending: Vec<(String, Value)> = encoded
        .chunks
        .into_iter()
        .enumerate()
        .map(|(i, value)| (chunk_key(i), value))
        .collect();
    while !pending.is_empty() {
        let round: Vec<(String, Value)> = pending.drain(..batch_size.min(pending.len())).collect();
        try_join_all(
            round
                .into_iter()
                .map(|(key, value)| async move { backend.set(&key, value).await }),
        )
        .await?;
    }

    backend.set(CHUNK_COUNT_KEY, json!(chunk_count)).await?;
    debug!(
        "saved {} groups in {} chunks (compressed: {})",
        snapshot.groups.len(),
        chunk_count,
        encoded.compressed
    );

    Ok(SaveReport {
        chunks: chunk_count,
        compressed: encoded.compressed,
        skipped_items: chunked.skipped_items,
        oversize_chunks: chunked.oversize_chunks,
    })
}

/// Every `chunk_<n>` key present, including chunks left past the committed
/// count by an interrupted save and chunks whose value no longer parses.
async fn stale_chunk_keys(backend: &dyn KvBackend) -> Result<Vec<String>, StorageError> {
    Ok(backend
        .keys()
        .await?
        .into_iter()
        .filter(|k| parse_chunk_key(k).is_some())
        .collect())
}

/// Serialize the index and chunks, compressing all of them or none.
///
/// Compression is kept only when it succeeds for every value, every encoded
/// value fits in `max_encoded` bytes, and the encoded total is smaller than
/// the raw total.
fn encode_state(
    chunked: &ChunkedState,
    config: &StorageConfig,
    max_encoded: usize,
) -> Result<EncodedState, StorageError> {
    let raw_index = serde_json::to_value(&chunked.index)?;
    let raw_chunks = chunked
        .chunks
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    if !config.compression_enabled() {
        return Ok(EncodedState {
            index: raw_index,
            chunks: raw_chunks,
            compressed: false,
        });
    }

    match compress_all(&raw_index, &raw_chunks, config.compression_level()) {
        Ok((index, chunks))
            if std::iter::once(&index)
                .chain(&chunks)
                .any(|v| serialized_len(v) > max_encoded) =>
        {
            debug!(
                "an encoded value exceeds {} bytes, writing raw",
                max_encoded
            );
        }
        Ok((index, chunks)) => {
            let raw_total: usize = std::iter::once(&raw_index)
                .chain(&raw_chunks)
                .map(serialized_len)
                .sum();
            let encoded_total: usize = std::iter::once(&index).chain(&chunks).map(serialized_len).sum();
            if encoded_total < raw_total {
                return Ok(EncodedState {
                    index,
                    chunks,
                    compressed: true,
                });
            }
            debug!(
                "compression does not pay off ({} vs {} bytes), writing raw",
                encoded_total, raw_total
            );
        }
        Err(e) => warn!("compression failed, writing uncompressed: {}", e),
    }

    Ok(EncodedState {
        index: raw_index,
        chunks: raw_chunks,
        compressed: false,
    })
}

fn compress_all(index: &Value, chunks: &[Value], level: i32) -> Result<(Value, Vec<Value>), CodecError> {
    let index = Value::String(codec::encode(index, level)?);
    let chunks = chunks
        .iter()
        .map(|c| codec::encode(c, level).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((index, chunks))
}

fn serialized_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}
