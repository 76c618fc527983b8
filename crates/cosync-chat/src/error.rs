//! Error types for cosync-chat

use thiserror::Error;

/// Result type alias using cosync-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a completion cycle
#[derive(Error, Debug)]
pub enum Error {
    /// The runtime client failed to open or continue the stream
    #[error(transparent)]
    Runtime(#[from] cosync_runtime::Error),

    /// A spawned completion task panicked or was aborted
    #[error("Completion task failed: {0}")]
    Join(String),
}

impl Error {
    /// Whether a caller-side retry could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Runtime(e) => e.is_retryable(),
            Error::Join(_) => false,
        }
    }
}
