//! Settings file for the digest command
//!
//! ```toml
//! [hash]
//! hasher = "blake3"
//! base = "base32"
//! length = 16
//!
//! [cache]
//! dir = "/var/cache/digestkit"
//! ```

use anyhow::{Context, Result};
use digestkit_core::HashOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Defaults for every hashing command
    pub hash: HashOptions,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Root for stamp certificates
    pub dir: Option<PathBuf>,
}

impl Settings {
    /// Load from `explicit`, or from the user config directory when present
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = Self::parse(&text)
            .with_context(|| format!("Invalid settings file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Directory for stamp certificates
    pub fn stamp_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.join("stamps")),
            None => dirs::cache_dir()
                .map(|dir| dir.join("digestkit").join("stamps"))
                .context("Could not determine the user cache directory"),
        }
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("digestkit").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use digestkit_core::{Base, HashAlgorithm};

    #[test]
    fn test_parse_partial() -> Result<()> {
        let settings = Settings::parse("[hash]\nhasher = \"sha512\"\nlength = 12\n")?;
        assert_eq!(settings.hash.hasher, HashAlgorithm::Sha512);
        assert_eq!(settings.hash.base, Base::Hex);
        assert_eq!(settings.hash.length, Some(12));
        assert!(settings.cache.dir.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_empty() -> Result<()> {
        let settings = Settings::parse("")?;
        assert_eq!(settings.hash.hasher, HashAlgorithm::Sha256);
        assert!(!settings.hash.include_types);
        Ok(())
    }

    #[test]
    fn test_unknown_hasher_rejected() {
        assert!(Settings::parse("[hash]\nhasher = \"md5\"\n").is_err());
    }

    #[test]
    fn test_load_explicit() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[cache]\ndir = \"/tmp/dk\"\n")?;

        let settings = Settings::load(Some(&path))?;
        assert_eq!(settings.stamp_dir()?, PathBuf::from("/tmp/dk/stamps"));

        assert!(Settings::load(Some(&temp_dir.path().join("missing.toml"))).is_err());
        Ok(())
    }
}
