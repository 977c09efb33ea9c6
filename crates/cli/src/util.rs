//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read a whole input, treating `None` and `-` as stdin
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Expand `paths` into regular files, in a stable order
///
/// Directories are only accepted when `recursive` is set.
pub fn collect_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Cannot access {}", path.display()))?;

        if meta.is_dir() {
            if !recursive {
                anyhow::bail!("{} is a directory (use -r)", path.display());
            }
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry
                    .with_context(|| format!("Failed to walk {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}
