//! digestkit core - deterministic content hashing of nested values
//!
//! This crate provides:
//! - A closed [`Value`] model for primitives, sequences, maps, sets and
//!   custom objects
//! - An [`ExtensionRegistry`] teaching the hasher about custom types
//! - Pluggable digest back ends (SHA-1, SHA-2, BLAKE3, xxHash64)
//! - Hex, base32 and 26-letter renderings of digests
//! - Path-based walking and tolerant comparison of value trees

pub mod base;
mod encode;
pub mod error;
pub mod hash;
pub mod hasher;
pub mod registry;
pub mod value;
pub mod walk;

// Re-export main types for convenience
pub use base::Base;
pub use error::{HashError, Result};
pub use hash::{digest_file, hash_bytes, DigestBackend, HashAlgorithm, IncrementalHasher};
pub use hasher::{hash_data, hash_file, ContentHasher, HashOptions, DEFAULT_MAX_DEPTH};
pub use registry::{default_registry, Encoded, ExtensionRegistry, RegistrySnapshot};
pub use value::{Kind, Object, Value};
pub use walk::{allclose, format_path, PathError, PathKey, Tolerance, ValuePath, Walker};
