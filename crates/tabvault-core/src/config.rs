//! Configuration for the store and its backend.
//!
//! Loaded from `config.toml` in the tabvault home directory. Every field is
//! optional; accessor methods apply defaults and floors so a partial or
//! missing file always yields a usable configuration.

use crate::backend::StorageLimits;
use crate::codec::DEFAULT_COMPRESSION_LEVEL;
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Default serialized-size target for one chunk.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 6000;

/// Default headroom kept below the backend's per-key limit.
pub const DEFAULT_SAFETY_MARGIN_BYTES: usize = 1024;

/// Default number of chunks written per round.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 3;

/// Environment variable overriding the home directory.
pub const HOME_ENV_VAR: &str = "TABVAULT_HOME";

/// Chunking, batching and compression settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Target serialized size of a chunk. Capped by the backend limit minus
    /// the safety margin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_bytes: Option<usize>,

    /// Bytes kept free below the backend's per-key limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_margin_bytes: Option<usize>,

    /// Chunks written concurrently per round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_batch_size: Option<usize>,

    /// Whether to store index and chunks compressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<bool>,

    /// zstd level used when compressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i32>,
}

impl StorageConfig {
    /// Returns the effective chunk ceiling for a backend with the given
    /// per-key limit. Never below 1.
    pub fn chunk_ceiling(&self, max_bytes_per_item: usize) -> usize {
        let cap = max_bytes_per_item
            .saturating_sub(self.safety_margin_bytes())
            .max(1);
        self.chunk_size_bytes
            .unwrap_or(DEFAULT_CHUNK_SIZE_BYTES)
            .clamp(1, cap)
    }

    #[inline]
    pub fn safety_margin_bytes(&self) -> usize {
        self.safety_margin_bytes
            .unwrap_or(DEFAULT_SAFETY_MARGIN_BYTES)
    }

    /// Returns the effective batch size. Enforces a minimum of 1.
    #[inline]
    pub fn write_batch_size(&self) -> usize {
        self.write_batch_size
            .unwrap_or(DEFAULT_WRITE_BATCH_SIZE)
            .max(1)
    }

    #[inline]
    pub fn compression_enabled(&self) -> bool {
        self.compression.unwrap_or(true)
    }

    /// Returns the zstd level, clamped to the range zstd accepts.
    #[inline]
    pub fn compression_level(&self) -> i32 {
        self.compression_level
            .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
            .clamp(1, 22)
    }
}

/// Overrides for the backend limits.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bytes_per_item: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_quota_bytes: Option<usize>,
}

impl BackendConfig {
    pub fn limits(&self) -> StorageLimits {
        let defaults = StorageLimits::default();
        StorageLimits {
            max_bytes_per_item: self
                .max_bytes_per_item
                .unwrap_or(defaults.max_bytes_per_item)
                .max(1),
            total_quota_bytes: self
                .total_quota_bytes
                .unwrap_or(defaults.total_quota_bytes)
                .max(1),
        }
    }
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

impl Config {
    /// Load `config.toml` from `home`. A missing file yields the defaults.
    pub fn load(home: &Path) -> io::Result<Self> {
        let path = home.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        toml::from_str(&content).map_err(|e| {
            io::Error::new(
                ErrorKind::InvalidData,
                format!("Failed to parse config: {}", e),
            )
        })
    }
}

/// Resolve the tabvault home directory.
///
/// Precedence:
/// 1. `home_override` (from the `--home` CLI flag)
/// 2. `TABVAULT_HOME` environment variable
/// 3. `~/.tabvault`
pub fn resolve_home(home_override: Option<PathBuf>) -> io::Result<PathBuf> {
    if let Some(path) = home_override {
        return Ok(path);
    }
    if let Ok(home) = std::env::var(HOME_ENV_VAR) {
        return Ok(PathBuf::from(home));
    }
    let home =
        home_dir().ok_or_else(|| io::Error::new(ErrorKind::NotFound, "Home directory not found"))?;
    Ok(home.join(".tabvault"))
}
