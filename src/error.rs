//! Error types shared by the compiler, the reader and the merger.

use std::path::{Path, PathBuf};

/// Result alias used across the crate.
pub type Result<T, E = DictionaryError> = std::result::Result<T, E>;

/// Errors raised while building, opening, querying or merging dictionaries.
///
/// Absent keys and empty result sets are never errors: lookups return
/// `None` and matchers return empty iterators.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    /// The artifact is not a dictionary file, has an unsupported version,
    /// is truncated or fails a checksum.
    #[error("format error: {0}")]
    Format(String),

    /// An operation was called in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was working on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The caller passed invalid arguments or parameters.
    #[error("usage error: {0}")]
    Usage(String),

    /// A payload could not be compressed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A spill chunk could not be written or read back.
    #[error("spill error: {0}")]
    Spill(#[from] bincode::Error),

    /// JSON metadata could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DictionaryError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        DictionaryError::Format(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        DictionaryError::State(msg.into())
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        DictionaryError::Usage(msg.into())
    }

    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DictionaryError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for [`DictionaryError::Format`].
    pub fn is_format(&self) -> bool {
        matches!(self, DictionaryError::Format(_))
    }

    /// True for [`DictionaryError::State`].
    pub fn is_state(&self) -> bool {
        matches!(self, DictionaryError::State(_))
    }

    /// True for [`DictionaryError::Usage`].
    pub fn is_usage(&self) -> bool {
        matches!(self, DictionaryError::Usage(_))
    }

    /// True for [`DictionaryError::Io`].
    pub fn is_io(&self) -> bool {
        matches!(self, DictionaryError::Io { .. })
    }
}

/// Attach a path to a `std::io::Result`.
pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| DictionaryError::io(path, source))
    }
}
