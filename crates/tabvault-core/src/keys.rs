//! Backend key names.

/// Root value: the group index with chunk references.
pub const MAIN_INDEX_KEY: &str = "mainIndex";

/// Number of `chunk_<i>` keys written by the last completed save.
pub const CHUNK_COUNT_KEY: &str = "chunkCount";

/// Single-slot backup of the model.
pub const BACKUP_KEY: &str = "lastBackup";

/// Whether `mainIndex` and the chunks were written through the codec.
pub const COMPRESSED_FLAG_KEY: &str = "isCompressed";

const CHUNK_KEY_PREFIX: &str = "chunk_";

/// Key for the chunk with the given global index.
#[inline]
pub fn chunk_key(index: usize) -> String {
    format!("{CHUNK_KEY_PREFIX}{index}")
}

/// Global index encoded in a chunk key, if `key` is one.
pub fn parse_chunk_key(key: &str) -> Option<usize> {
    key.strip_prefix(CHUNK_KEY_PREFIX)?.parse().ok()
}
