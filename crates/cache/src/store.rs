//! Crash-safe file writes

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Atomic write helper
///
/// Writes data to a temporary file next to the target, fsyncs it, then
/// renames it over the target path. Readers see either the old or the new
/// content, never a partial file.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write temp file for {}", target.display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file onto {}", target.display()))?;

    sync_dir(parent);
    Ok(())
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    // Best effort; the rename already happened
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
