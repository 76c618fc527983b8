//! Error types for cosync-runtime

use thiserror::Error;

/// Result type alias using cosync-runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a runtime client while opening or consuming a response stream
#[derive(Error, Debug)]
pub enum Error {
    /// The transport failed (connection reset, stream closed early, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request was aborted through its cancellation token
    #[error("Request aborted")]
    Aborted,

    /// A replay script could not be loaded or has run out of responses
    #[error("Script error: {0}")]
    Script(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this error is the transport reporting its own abort
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Check if this error is worth retrying.
    ///
    /// Nothing in this workspace retries; callers layering a retry policy on
    /// top of a completion cycle can use this to classify failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_transport() {
        assert!(Error::transport("connection reset by peer").is_retryable());
    }

    #[test]
    fn test_not_retryable_abort_or_script() {
        assert!(!Error::Aborted.is_retryable());
        assert!(!Error::Script("no responses left".into()).is_retryable());
    }

    #[test]
    fn test_is_abort() {
        assert!(Error::Aborted.is_abort());
        assert!(!Error::transport("closed").is_abort());
    }
}
