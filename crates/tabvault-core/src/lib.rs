//! tabvault-core: chunked state storage for saved tab groups.
//!
//! The model (groups of saved pages) is persisted into a key-value backend
//! with a per-key size limit and a total quota by splitting items into
//! byte-bounded chunks referenced from a small index. Loading repairs
//! damaged chunks in place, and a single-generation backup allows recovery
//! when the index itself is lost.
//!
//! The CLI crate is a thin wrapper over [`StateStore`].

pub mod backend;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod json_ext;
pub mod keys;
pub mod model;
pub mod safe_io;
pub mod status;
pub mod store;
pub mod validate;

pub use backend::{KvBackend, LocalBackend, MemoryBackend, StorageLimits};
pub use config::{Config, StorageConfig, resolve_home};
pub use error::{ImportError, StorageError};
pub use import::ImportSummary;
pub use model::{Group, Item, StateSnapshot};
pub use status::DiagnosticsReport;
pub use store::{Backup, LoadFault, LoadPhase, LoadReport, SaveReport, StateStore};
