//! digestkit cache - on-disk results keyed by dependency fingerprints
//!
//! This crate provides:
//! - `Cacher`: one serialized value per dependency hash
//! - `CacheStamp`: validity certificates for product files
//! - Crash-safe atomic writes

pub mod cacher;
pub mod stamp;
pub mod store;

// Re-export main types for convenience
pub use cacher::{CacheFormat, CacheMeta, Cacher, OnError};
pub use stamp::{CacheStamp, Certificate, ProductCheck, ProductRecord, Staleness};
pub use store::atomic_write;

/// Common result type used throughout digestkit-cache
pub type Result<T> = anyhow::Result<T>;
