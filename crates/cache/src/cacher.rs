//! File-backed cache of one value per dependency fingerprint
//!
//! Layout inside the cache directory:
//! ```text
//! <dpath>/
//!   <fname>_<hash>.bin        payload (bincode or JSON)
//!   <fname>_<hash>.bin.meta   JSON sidecar describing the payload
//! ```
//! `<hash>` is derived from the dependency value with `hash_data`, so any
//! change to the dependencies selects a different file.

use crate::store::{atomic_write, remove_if_exists};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use digestkit_core::{hash_data, Base, HashAlgorithm, HashOptions, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Default application directory name under the user cache dir
pub const DEFAULT_APPNAME: &str = "digestkit";

/// Length of the dependency hash embedded in file names
const FNAME_HASH_LEN: usize = 32;

/// Payload serialization format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheFormat {
    /// Compact binary (bincode)
    #[default]
    Bincode,
    /// Human-readable JSON
    Json,
}

impl CacheFormat {
    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bincode => "bin",
            Self::Json => "json",
        }
    }

    fn serialize<T: Serialize>(&self, data: &T) -> Result<Vec<u8>> {
        match self {
            Self::Bincode => bincode::serialize(data).context("Failed to encode cache payload"),
            Self::Json => serde_json::to_vec_pretty(data).context("Failed to encode cache payload"),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Self::Bincode => bincode::deserialize(bytes).context("Failed to decode cache payload"),
            Self::Json => serde_json::from_slice(bytes).context("Failed to decode cache payload"),
        }
    }
}

/// What `tryload` does with an unreadable payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Return the error
    #[default]
    Raise,
    /// Delete the payload and report a miss
    Clear,
}

/// Sidecar written next to every payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Cache name
    pub fname: String,
    /// Full dependency hash
    pub depends_hash: String,
    /// Back end the dependency hash was computed with
    pub hasher: HashAlgorithm,
    /// Payload format
    pub format: CacheFormat,
    /// When the payload was written
    pub created: DateTime<Utc>,
}

/// On-disk cache for a single computation
#[derive(Debug, Clone)]
pub struct Cacher {
    fname: String,
    depends: Value,
    dpath: Option<PathBuf>,
    appname: String,
    hash_options: HashOptions,
    format: CacheFormat,
    enabled: bool,
}

impl Cacher {
    /// Cache named `fname` whose validity is keyed by `depends`
    pub fn new(fname: impl Into<String>, depends: impl Into<Value>) -> Self {
        Self {
            fname: fname.into(),
            depends: depends.into(),
            dpath: None,
            appname: DEFAULT_APPNAME.to_string(),
            hash_options: HashOptions::new().base(Base::Abc),
            format: CacheFormat::default(),
            enabled: true,
        }
    }

    /// Store files in `dpath` instead of the user cache directory
    pub fn dpath(mut self, dpath: impl Into<PathBuf>) -> Self {
        self.dpath = Some(dpath.into());
        self
    }

    /// Subdirectory of the user cache directory
    pub fn appname(mut self, appname: impl Into<String>) -> Self {
        self.appname = appname.into();
        self
    }

    /// Digest back end for the dependency hash
    pub fn hasher(mut self, hasher: HashAlgorithm) -> Self {
        self.hash_options.hasher = hasher;
        self
    }

    /// Full control over how dependencies are hashed
    pub fn hash_options(mut self, options: HashOptions) -> Self {
        self.hash_options = options;
        self
    }

    /// Payload format
    pub fn format(mut self, format: CacheFormat) -> Self {
        self.format = format;
        self
    }

    /// A disabled cache always misses and never writes
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether reads and writes are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cache name
    pub fn fname(&self) -> &str {
        &self.fname
    }

    /// Directory holding the cache files
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.dpath {
            Some(dpath) => Ok(dpath.clone()),
            None => dirs::cache_dir()
                .map(|dir| dir.join(&self.appname))
                .context("Could not determine the user cache directory"),
        }
    }

    /// Full hash of the dependency value
    pub fn depends_hash(&self) -> Result<String> {
        hash_data(&self.depends, &self.hash_options)
            .with_context(|| format!("Failed to hash dependencies of cache '{}'", self.fname))
    }

    /// Path of the payload for the current dependencies
    pub fn fpath(&self) -> Result<PathBuf> {
        let hash = self.depends_hash()?;
        let short: String = hash.chars().take(FNAME_HASH_LEN).collect();
        Ok(self.cache_dir()?.join(format!(
            "{}_{}.{}",
            self.fname,
            short,
            self.format.extension()
        )))
    }

    fn meta_path(&self) -> Result<PathBuf> {
        let mut path = self.fpath()?.into_os_string();
        path.push(".meta");
        Ok(PathBuf::from(path))
    }

    /// Whether a payload exists for the current dependencies
    pub fn exists(&self) -> Result<bool> {
        Ok(self.enabled && self.fpath()?.is_file())
    }

    /// Load the payload, `None` on a miss; unreadable payloads are errors
    pub fn tryload<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.tryload_with(OnError::Raise)
    }

    /// Load the payload, `None` on a miss
    pub fn tryload_with<T: DeserializeOwned>(&self, on_error: OnError) -> Result<Option<T>> {
        if !self.enabled {
            debug!(fname = %self.fname, "cache disabled, skipping load");
            return Ok(None);
        }

        let fpath = self.fpath()?;
        if !fpath.is_file() {
            debug!(path = %fpath.display(), "cache miss");
            return Ok(None);
        }

        let loaded = std::fs::read(&fpath)
            .with_context(|| format!("Failed to read cache file: {}", fpath.display()))
            .and_then(|bytes| self.format.deserialize(&bytes));

        match loaded {
            Ok(data) => {
                debug!(path = %fpath.display(), "cache hit");
                Ok(Some(data))
            }
            Err(e) => match on_error {
                OnError::Raise => {
                    Err(e.context(format!("Corrupt cache file: {}", fpath.display())))
                }
                OnError::Clear => {
                    warn!(path = %fpath.display(), error = %e, "clearing corrupt cache file");
                    self.clear()?;
                    Ok(None)
                }
            },
        }
    }

    /// Load the payload, failing on a miss
    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        match self.tryload()? {
            Some(data) => Ok(data),
            None => anyhow::bail!(
                "Cache miss for '{}' ({})",
                self.fname,
                self.fpath()?.display()
            ),
        }
    }

    /// Write the payload and its sidecar
    pub fn save<T: Serialize>(&self, data: &T) -> Result<()> {
        if !self.enabled {
            debug!(fname = %self.fname, "cache disabled, skipping save");
            return Ok(());
        }

        let fpath = self.fpath()?;
        let payload = self.format.serialize(data)?;
        atomic_write(&fpath, &payload)?;

        let meta = CacheMeta {
            fname: self.fname.clone(),
            depends_hash: self.depends_hash()?,
            hasher: self.hash_options.hasher,
            format: self.format,
            created: Utc::now(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).context("Failed to encode cache meta")?;
        atomic_write(&self.meta_path()?, &meta_bytes)?;

        info!(path = %fpath.display(), bytes = payload.len(), "saved cache");
        Ok(())
    }

    /// Sidecar for the current payload, if any
    pub fn meta(&self) -> Result<Option<CacheMeta>> {
        let path = self.meta_path()?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read cache meta: {}", path.display()))?;
        let meta = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt cache meta: {}", path.display()))?;
        Ok(Some(meta))
    }

    /// Load the payload, or compute, save and return it
    pub fn ensure<T, F>(&self, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(data) = self.tryload_with(OnError::Clear)? {
            return Ok(data);
        }
        let data = compute()?;
        self.save(&data)?;
        Ok(data)
    }

    /// Delete the payload and sidecar for the current dependencies
    pub fn clear(&self) -> Result<()> {
        let removed = remove_if_exists(&self.fpath()?)?;
        remove_if_exists(&self.meta_path()?)?;
        if removed {
            info!(fname = %self.fname, "cleared cache");
        }
        Ok(())
    }

    /// Payload files of this cache for any dependency hash
    pub fn existing_versions(&self) -> Result<Vec<PathBuf>> {
        let dir = self.cache_dir()?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = format!("{}_", self.fname);
        let suffix = format!(".{}", self.format.extension());
        let hash_len = self.depends_hash()?.chars().take(FNAME_HASH_LEN).count();
        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list cache directory: {}", dir.display()))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let hash = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix));
            // Names like `<fname>_big_<hash>` belong to other caches
            let is_version = hash.is_some_and(|h| {
                h.len() == hash_len
                    && h.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            });
            if is_version {
                versions.push(path);
            }
        }
        versions.sort();
        Ok(versions)
    }
}
