//! Error types for rotary-sync.

use thiserror::Error;

/// All errors that can arise while issuing a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A connection command does not end with the host it is meant to reach.
    #[error("connection command must end with host '{host}': {command}")]
    Configuration { command: String, host: String },

    /// The external command exited with a status that is not tolerated.
    #[error("command failed ({status}): {command}")]
    CommandFailed { command: String, status: String },

    /// The external command could not be started at all.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Method options rejected at construction.
    #[error("invalid transfer option: {0}")]
    InvalidOption(String),
}
