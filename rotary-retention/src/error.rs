//! Error types for rotary-retention.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while scanning or pruning snapshots.
#[derive(Debug, Error)]
pub enum RetentionError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The timestamp pattern contains an unknown specifier.
    #[error("invalid timestamp format '{0}'")]
    InvalidFormat(String),
}

/// Convenience constructor for [`RetentionError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RetentionError {
    RetentionError::Io {
        path: path.into(),
        source,
    }
}
