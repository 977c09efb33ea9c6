//! Digest back ends and streaming helpers
//!
//! Every back end is driven through [`DigestBackend`], so the encoder can
//! stream bytes into SHA-1, SHA-2, BLAKE3 or xxHash64 without knowing which
//! one was selected.

use crate::error::{HashError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Size of the read buffer used when streaming files
const FILE_CHUNK: usize = 8192;

/// Incremental digest primitive
///
/// Implement this to plug a digest that is not built in; pass the boxed
/// instance to [`crate::ContentHasher::hash_with_backend`].
pub trait DigestBackend: Send {
    /// Feed more bytes
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the raw digest
    fn finalize(self: Box<Self>) -> Vec<u8>;

    /// Short name used in log output
    fn name(&self) -> &str;
}

/// Built-in digest algorithms, selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-1 (20 bytes)
    Sha1,
    /// SHA-256 (32 bytes)
    #[default]
    Sha256,
    /// SHA-512 (64 bytes)
    Sha512,
    /// BLAKE3 (32 bytes), requires the `blake3` feature
    Blake3,
    /// xxHash64 (8 bytes, not cryptographic), requires the `xxhash` feature
    #[serde(rename = "xxhash64", alias = "xxh64", alias = "xx64")]
    Xxh64,
}

impl HashAlgorithm {
    /// Every algorithm this crate knows about, available or not
    pub const ALL: [Self; 5] = [
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Blake3,
        Self::Xxh64,
    ];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
            Self::Xxh64 => "xxhash64",
        }
    }

    /// Raw digest width in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 | Self::Blake3 => 32,
            Self::Sha512 => 64,
            Self::Xxh64 => 8,
        }
    }

    /// Whether the back end was compiled into this build
    pub fn is_available(&self) -> bool {
        match self {
            Self::Sha1 | Self::Sha256 | Self::Sha512 => true,
            Self::Blake3 => cfg!(feature = "blake3"),
            Self::Xxh64 => cfg!(feature = "xxhash"),
        }
    }

    /// Construct a fresh back end
    pub fn backend(&self) -> Result<Box<dyn DigestBackend>> {
        match self {
            Self::Sha1 => Ok(Box::new(RustCrypto::new(sha1::Sha1::default(), "sha1"))),
            Self::Sha256 => Ok(Box::new(RustCrypto::new(sha2::Sha256::default(), "sha256"))),
            Self::Sha512 => Ok(Box::new(RustCrypto::new(sha2::Sha512::default(), "sha512"))),
            Self::Blake3 => blake3_backend(),
            Self::Xxh64 => xxh64_backend(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            "xxhash64" | "xxh64" | "xx64" => Ok(Self::Xxh64),
            _ => Err(HashError::unsupported(s, "unknown hasher name")),
        }
    }
}

/// Adapter for the RustCrypto `Digest` implementations
struct RustCrypto<D> {
    inner: D,
    name: &'static str,
}

impl<D> RustCrypto<D> {
    fn new(inner: D, name: &'static str) -> Self {
        Self { inner, name }
    }
}

impl<D> DigestBackend for RustCrypto<D>
where
    D: sha2::Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.inner, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        sha2::Digest::finalize(self.inner).to_vec()
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(feature = "blake3")]
struct Blake3Backend(blake3::Hasher);

#[cfg(feature = "blake3")]
impl DigestBackend for Blake3Backend {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().as_bytes().to_vec()
    }

    fn name(&self) -> &str {
        "blake3"
    }
}

#[cfg(feature = "blake3")]
fn blake3_backend() -> Result<Box<dyn DigestBackend>> {
    Ok(Box::new(Blake3Backend(blake3::Hasher::new())))
}

#[cfg(not(feature = "blake3"))]
fn blake3_backend() -> Result<Box<dyn DigestBackend>> {
    Err(HashError::unsupported("blake3", "built without the `blake3` feature"))
}

#[cfg(feature = "xxhash")]
struct Xxh64Backend(xxhash_rust::xxh64::Xxh64);

#[cfg(feature = "xxhash")]
impl DigestBackend for Xxh64Backend {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.digest().to_be_bytes().to_vec()
    }

    fn name(&self) -> &str {
        "xxhash64"
    }
}

#[cfg(feature = "xxhash")]
fn xxh64_backend() -> Result<Box<dyn DigestBackend>> {
    Ok(Box::new(Xxh64Backend(xxhash_rust::xxh64::Xxh64::new(0))))
}

#[cfg(not(feature = "xxhash"))]
fn xxh64_backend() -> Result<Box<dyn DigestBackend>> {
    Err(HashError::unsupported("xxhash64", "built without the `xxhash` feature"))
}

/// Incremental hasher for building digests across multiple chunks
pub struct IncrementalHasher {
    inner: Box<dyn DigestBackend>,
}

impl IncrementalHasher {
    /// Create a new incremental hasher for the given algorithm
    pub fn new(algorithm: HashAlgorithm) -> Result<Self> {
        Ok(Self {
            inner: algorithm.backend()?,
        })
    }

    /// Wrap an existing back end
    pub fn from_backend(inner: Box<dyn DigestBackend>) -> Self {
        Self { inner }
    }

    /// Update the digest with more data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the raw digest
    pub fn finalize(self) -> Vec<u8> {
        self.inner.finalize()
    }
}

impl fmt::Debug for IncrementalHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalHasher")
            .field("backend", &self.inner.name())
            .finish()
    }
}

/// Digest a byte slice in one shot
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> Result<Vec<u8>> {
    let mut hasher = IncrementalHasher::new(algorithm)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// Digest a file by streaming it in fixed-size chunks
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
    use std::fs::File;
    use std::io::{BufReader, Read};

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = IncrementalHasher::new(algorithm)?;

    let mut buffer = [0u8; FILE_CHUNK];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}
