//! Hash file contents, sha256sum style

use crate::util;
use anyhow::{Context, Result};
use digestkit_core::{ContentHasher, HashOptions};
use std::path::PathBuf;

pub fn run(paths: &[PathBuf], recursive: bool, options: &HashOptions) -> Result<()> {
    let files = util::collect_files(paths, recursive)?;
    let hasher = ContentHasher::new(options.clone());

    for path in &files {
        let digest = hasher
            .hash_file(path)
            .with_context(|| format!("Failed to hash {}", path.display()))?;
        println!("{}  {}", digest, path.display());
    }

    Ok(())
}
