//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Stale or damaged cache state is never fatal: [`CacheError::Unusable`] is
/// collapsed into an empty table by the store and never reaches callers.
/// Parser failures are propagated unchanged.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The persisted cache cannot be used: truncated, corrupt, or written by
    /// a different cache format or tool version.
    #[error("cache unusable: {reason}")]
    Unusable {
        /// Description of what made the cache unusable.
        reason: String,
    },

    /// A serialization error occurred while encoding the cache.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The recipe parser failed on a file.
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// The recipe that failed to parse.
        path: PathBuf,
        /// The parser's description of the failure.
        reason: String,
    },

    /// A recipe path or variant tag cannot form a virtual filename.
    #[error("invalid virtual filename: {0}")]
    InvalidName(#[from] kiln_common::InvalidName),

    /// A variant declared by a recipe has no snapshot.
    #[error("no snapshot for declared variant {name}")]
    MissingVariant {
        /// Encoded virtual filename of the missing variant.
        name: String,
    },
}
