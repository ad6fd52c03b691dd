//! Whole-file write primitives for lock files.
//!
//! Lock files are read concurrently by other processes, so they are never
//! written in place. Every write goes to a temporary file in the same directory
//! first, is synced, and is then moved into place in one step:
//!
//! - [`atomic_write`] replaces the target with `rename()`.
//! - [`create_exclusive`] publishes the target with `hard_link()`, which fails
//!   with `AlreadyExists` if the target is present. Readers therefore see either
//!   no file or the complete content, never an empty or partial file.
//!
//! Temporary files are named `.{filename}.{pid}.{seq}.tmp`, so concurrent
//! writers never share one. On crash a temporary file may remain; it never has
//! the `.lock` extension and is ignored by lock enumeration.

use crate::error::{CorralError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Atomically replace `path` with `content`.
///
/// The parent directory is created if missing.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            CorralError::UserError(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path).map_err(|e| {
        CorralError::UserError(format!("invalid file path '{}': {}", path.display(), e))
    })?;

    write_and_sync(&temp_path, content).map_err(|e| {
        CorralError::UserError(format!(
            "failed to write temporary file '{}': {}",
            temp_path.display(),
            e
        ))
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        CorralError::UserError(format!(
            "failed to atomically replace '{}': {}",
            path.display(),
            e
        ))
    })?;

    sync_parent(path);
    Ok(())
}

/// Create `path` with `content`, failing if it already exists.
///
/// Errors are returned as `io::Error` so callers can tell contention
/// (`ErrorKind::AlreadyExists`) apart from real failures. On filesystems without
/// hard links this falls back to `create_new` followed by a write.
pub fn create_exclusive<P: AsRef<Path>>(path: P, content: &[u8]) -> io::Result<()> {
    let path = path.as_ref();
    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);

    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        Err(_) => create_new_and_write(path, content),
    }
}

/// Generate a unique temporary file path in the same directory as the target.
fn generate_temp_path(target: &Path) -> io::Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "missing file name"))?;

    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!(".{}.{}.{}.tmp", filename, std::process::id(), seq);
    Ok(parent.join(temp_name))
}

/// Write content to a new file and sync it to disk, removing it on failure.
fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let result = File::create(path).and_then(|mut file| {
        file.write_all(content)?;
        file.sync_all()
    });
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

fn create_new_and_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let written = file.write_all(content).and_then(|()| file.sync_all());
    if written.is_err() {
        let _ = fs::remove_file(path);
    }
    written
}

/// Persist the directory entry. Best effort.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    #[cfg(not(unix))]
    let _ = path;
}
