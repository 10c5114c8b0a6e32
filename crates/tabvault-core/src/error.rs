//! Error types surfaced by the store.
//!
//! Per-item and per-chunk faults never show up here: the loader and the
//! import normalizer recover them locally and report them as counts or
//! [`LoadFault`](crate::store::LoadFault) values. Only per-operation failures
//! reach the caller.

use std::io;
use thiserror::Error;

/// Failure of a backend read or write.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A single value exceeds the backend's per-key byte limit.
    #[error("value for '{key}' is {size} bytes, over the per-key limit of {limit} bytes")]
    ItemTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    /// The write would push total usage past the backend quota.
    #[error("storage quota exceeded: write needs {needed} bytes, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    /// The backend could not be reached.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of an external import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The payload matched none of the known shapes.
    #[error("unsupported import format: expected a URL list, {{groups: [...]}}, or a backup export")]
    UnsupportedFormat,

    /// Every candidate group was dropped during normalization.
    #[error("no valid data found in import")]
    NoValidData,

    /// The normalized data could not be persisted.
    #[error("import could not be saved: {0}")]
    Storage(#[from] StorageError),
}

/// Failure of the chunk codec. Never surfaced to callers; the writer falls
/// back to raw values and the loader treats the value as corrupt.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compress(io::Error),

    #[error("decompression failed: {0}")]
    Decompress(io::Error),

    #[error("encoded value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
