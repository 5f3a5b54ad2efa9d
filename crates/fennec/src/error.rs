//! Error and `Result` types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested key is absent from the index and from every fallback segment.
    #[error("key not found")]
    NotFound,

    /// A log file ends in a partial record frame.
    #[error("corrupted log file: {path}")]
    Corruption {
        /// File whose tail failed to decode.
        path: PathBuf,
    },

    /// Operation submitted after shutdown began.
    #[error("store is closed")]
    Closed,

    /// Underlying filesystem failure, carrying the operation and the path it
    /// was applied to.
    #[error("{op} {path}: {source}")]
    Io {
        /// Operation that failed (`open`, `write`, `rename`, ...).
        op: &'static str,
        /// Path the operation was applied to.
        path: PathBuf,
        /// The propagated I/O error.
        #[source]
        source: io::Error,
    },

    /// Key or value exceeds the codec's length bound.
    #[error("{what} is {len} bytes, over the {max}-byte limit")]
    RecordTooLarge {
        /// Which field overflowed (`"key"` or `"value"`).
        what: &'static str,
        /// Actual length in bytes.
        len: usize,
        /// Maximum allowed length in bytes.
        max: usize,
    },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corruption(path: impl Into<PathBuf>) -> Self {
        Self::Corruption { path: path.into() }
    }
}
