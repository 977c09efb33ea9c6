//! Error types for content hashing

use thiserror::Error;

/// Errors raised while hashing a value or a file
#[derive(Debug, Error)]
pub enum HashError {
    /// A custom object had no serializer in the registry, not even through
    /// a declared ancestor
    #[error("unhashable type `{type_name}`: no serializer registered for it or its ancestors")]
    UnhashableType {
        /// Rust type name of the offending value
        type_name: String,
    },

    /// The requested digest back end is unknown or was compiled out
    #[error("unsupported hasher `{name}`: {reason}")]
    UnsupportedHasher {
        /// Name the caller asked for
        name: String,
        /// Why it cannot be used
        reason: String,
    },

    /// The value is nested deeper than the configured bound
    #[error("value nesting exceeds the traversal limit ({depth} > {limit})")]
    Traversal {
        /// Depth at which traversal stopped
        depth: usize,
        /// Configured maximum depth
        limit: usize,
    },

    /// A registered serializer rejected its input
    #[error("serializer for `{type_name}` failed: {message}")]
    Extension {
        /// Name the serializer was registered under
        type_name: String,
        /// Message produced by the serializer
        message: String,
    },

    /// Unknown output alphabet name
    #[error("invalid base `{0}`: expected one of hex, base32, abc")]
    InvalidBase(String),

    /// I/O failure while streaming a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HashError {
    /// Build an [`HashError::Extension`] from inside a serializer
    pub fn extension(type_name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Extension {
            type_name: type_name.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedHasher {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout digestkit-core
pub type Result<T> = std::result::Result<T, HashError>;
