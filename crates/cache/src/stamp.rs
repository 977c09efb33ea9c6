//! Freshness certificates for externally produced files
//!
//! A [`CacheStamp`] does not store results itself. It records a certificate
//! saying "these product files were built from these dependencies", and
//! later reports whether that still holds.

use crate::cacher::{CacheFormat, Cacher};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use digestkit_core::{hash_data, hash_file, HashAlgorithm, HashOptions, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// How product files are compared against the certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductCheck {
    /// Size and content hash
    #[default]
    Hash,
    /// Size only
    Size,
}

/// Recorded state of one product file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product path as given to the stamp
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Hex content digest, absent when only sizes are checked
    pub hash: Option<String>,
}

/// Persisted claim that products match dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Digest of the dependencies at renewal time
    pub depends_hash: String,
    /// Algorithm behind every digest in the certificate
    pub hasher: HashAlgorithm,
    /// Products in the order they were added
    pub products: Vec<ProductRecord>,
    /// Renewal time
    pub created: DateTime<Utc>,
    /// Time after which the certificate is stale
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why a stamp is or is not fresh
#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    /// Certificate matches dependencies and products
    Fresh,
    /// Stamp was built with `enabled(false)`
    Disabled,
    /// Nothing has been renewed yet
    NoCertificate,
    /// Certificate file exists but cannot be read
    CorruptCertificate(String),
    /// Dependencies or hash algorithm differ from the certificate
    DependsChanged,
    /// Products were added, removed or reordered
    ProductSetChanged,
    /// A recorded product no longer exists
    ProductMissing(PathBuf),
    /// A recorded product has a different size or content
    ProductChanged(PathBuf),
    /// Certificate passed its expiry time
    Expired(DateTime<Utc>),
}

impl Staleness {
    /// Whether the products can be reused
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Disabled => write!(f, "stamp disabled"),
            Self::NoCertificate => write!(f, "no certificate"),
            Self::CorruptCertificate(reason) => write!(f, "corrupt certificate: {}", reason),
            Self::DependsChanged => write!(f, "dependencies changed"),
            Self::ProductSetChanged => write!(f, "product list changed"),
            Self::ProductMissing(path) => write!(f, "product missing: {}", path.display()),
            Self::ProductChanged(path) => write!(f, "product changed: {}", path.display()),
            Self::Expired(at) => write!(f, "expired at {}", at.to_rfc3339()),
        }
    }
}

/// Tracks whether a set of products is up to date with its dependencies
#[derive(Debug, Clone)]
pub struct CacheStamp {
    fname: String,
    depends: Value,
    products: Vec<PathBuf>,
    expires: Option<Duration>,
    check: ProductCheck,
    hasher: HashAlgorithm,
    cacher: Cacher,
}

impl CacheStamp {
    /// Stamp named `fname` stored under `dpath`
    pub fn new(
        fname: impl Into<String>,
        dpath: impl Into<PathBuf>,
        depends: impl Into<Value>,
    ) -> Self {
        let fname = fname.into();
        // The certificate lives at a fixed path; depends are compared inside it
        let cacher = Cacher::new(format!("{}_stamp", fname), Value::Null)
            .dpath(dpath)
            .format(CacheFormat::Json);
        Self {
            fname,
            depends: depends.into(),
            products: Vec::new(),
            expires: None,
            check: ProductCheck::default(),
            hasher: HashAlgorithm::default(),
            cacher,
        }
    }

    /// Add a product file
    pub fn product(mut self, path: impl Into<PathBuf>) -> Self {
        self.products.push(path.into());
        self
    }

    /// Certificates older than `after` are stale
    pub fn expires(mut self, after: Duration) -> Self {
        self.expires = Some(after);
        self
    }

    /// How products are compared on check
    pub fn product_check(mut self, check: ProductCheck) -> Self {
        self.check = check;
        self
    }

    /// Algorithm for dependency and product digests
    pub fn hasher(mut self, hasher: HashAlgorithm) -> Self {
        self.hasher = hasher;
        self
    }

    /// Disabled stamps are never fresh and never write
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.cacher = self.cacher.enabled(enabled);
        self
    }

    /// Stamp name
    pub fn fname(&self) -> &str {
        &self.fname
    }

    /// Path of the certificate file
    pub fn certificate_path(&self) -> Result<PathBuf> {
        self.cacher.fpath()
    }

    fn hash_options(&self) -> HashOptions {
        HashOptions::new().hasher(self.hasher)
    }

    fn depends_hash(&self) -> Result<String> {
        hash_data(&self.depends, &self.hash_options())
            .with_context(|| format!("Failed to hash dependencies of stamp '{}'", self.fname))
    }

    fn record(&self, path: &Path) -> Result<ProductRecord> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat product: {}", path.display()))?;
        let hash = match self.check {
            ProductCheck::Hash => Some(hash_file(path, &self.hash_options())?),
            ProductCheck::Size => None,
        };
        Ok(ProductRecord {
            path: path.to_path_buf(),
            size: meta.len(),
            hash,
        })
    }

    /// Stored certificate, if one exists and parses
    pub fn certificate(&self) -> Result<Option<Certificate>> {
        self.cacher.tryload()
    }

    /// Check the certificate against current dependencies and products
    pub fn expired(&self) -> Result<Staleness> {
        let status = self.check_certificate()?;
        debug!(fname = %self.fname, status = %status, "checked stamp");
        Ok(status)
    }

    fn check_certificate(&self) -> Result<Staleness> {
        if !self.cacher.is_enabled() {
            return Ok(Staleness::Disabled);
        }

        let cert = match self.cacher.tryload::<Certificate>() {
            Ok(Some(cert)) => cert,
            Ok(None) => return Ok(Staleness::NoCertificate),
            Err(e) => return Ok(Staleness::CorruptCertificate(format!("{:#}", e))),
        };

        if cert.hasher != self.hasher || cert.depends_hash != self.depends_hash()? {
            return Ok(Staleness::DependsChanged);
        }

        if let Some(expires_at) = cert.expires_at {
            if Utc::now() >= expires_at {
                return Ok(Staleness::Expired(expires_at));
            }
        }

        let recorded: Vec<&Path> = cert.products.iter().map(|p| p.path.as_path()).collect();
        let current: Vec<&Path> = self.products.iter().map(PathBuf::as_path).collect();
        if recorded != current {
            return Ok(Staleness::ProductSetChanged);
        }

        for expected in &cert.products {
            if !expected.path.exists() {
                return Ok(Staleness::ProductMissing(expected.path.clone()));
            }
            let size = std::fs::metadata(&expected.path)
                .with_context(|| format!("Failed to stat product: {}", expected.path.display()))?
                .len();
            if size != expected.size {
                return Ok(Staleness::ProductChanged(expected.path.clone()));
            }
            if self.check == ProductCheck::Hash {
                let actual = hash_file(&expected.path, &self.hash_options())?;
                if expected.hash.as_deref() != Some(actual.as_str()) {
                    return Ok(Staleness::ProductChanged(expected.path.clone()));
                }
            }
        }

        Ok(Staleness::Fresh)
    }

    /// Record the current state as fresh; products must exist
    pub fn renew(&self) -> Result<Option<Certificate>> {
        if !self.cacher.is_enabled() {
            debug!(fname = %self.fname, "stamp disabled, skipping renew");
            return Ok(None);
        }

        let products = self
            .products
            .iter()
            .map(|path| self.record(path))
            .collect::<Result<Vec<_>>>()?;

        let created = Utc::now();
        let expires_at = match self.expires {
            Some(after) => {
                let delta = chrono::Duration::from_std(after)
                    .context("Stamp expiry is out of range")?;
                let expires_at = created
                    .checked_add_signed(delta)
                    .context("Stamp expiry is out of range")?;
                Some(expires_at)
            }
            None => None,
        };

        let cert = Certificate {
            depends_hash: self.depends_hash()?,
            hasher: self.hasher,
            products,
            created,
            expires_at,
        };
        self.cacher.save(&cert)?;
        info!(fname = %self.fname, products = cert.products.len(), "renewed stamp");
        Ok(Some(cert))
    }

    /// Delete the certificate
    pub fn clear(&self) -> Result<()> {
        self.cacher.clear()
    }
}
