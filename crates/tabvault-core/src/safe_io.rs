//! Atomic file writes for the directory backend.
//!
//! Each stored value is a whole file. Writing to a temporary sibling and
//! renaming it over the target means a value is either the old or the new
//! content, never a torn mix, even if the process dies mid-write.

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Atomically write bytes to a file.
///
/// Writes to a temporary file (`.tmp` suffix) with fsync, then renames to the
/// target path.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written, synced,
/// or renamed.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }

    // Sync to disk before rename
    file.sync_all()?;

    fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("value.json");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!path.with_extension("tmp").exists());
    }
}
