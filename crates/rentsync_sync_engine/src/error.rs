//! Error types for the sync engine.

use crate::summary::PartialSync;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Conflicts between local and remote records are never errors; they are
/// settled by revision during the merge.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The pull failed. Nothing local was changed.
    #[error("pull failed: {cause}")]
    PullFailed {
        /// What went wrong.
        #[source]
        cause: Box<SyncError>,
    },

    /// The push failed after the pull was merged.
    ///
    /// Pending changes stay in the change log and the checkpoint did not
    /// move.
    #[error("push failed: {cause}")]
    PushFailed {
        /// What went wrong.
        #[source]
        cause: Box<SyncError>,
        /// Work the cycle had completed before the push.
        partial: PartialSync,
    },

    /// Another cycle is running.
    #[error("a sync cycle is already in progress")]
    AlreadyInProgress,

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with an error status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local replica error.
    #[error("local error: {0}")]
    Local(#[from] rentsync_core::CoreError),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Wraps a gateway error from the pull phase.
    pub fn pull_failed(cause: SyncError) -> Self {
        Self::PullFailed {
            cause: Box::new(cause),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PullFailed { cause } | SyncError::PushFailed { cause, .. } => {
                cause.is_retryable()
            }
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Server { status, .. } => *status >= 500 || *status == 429,
            SyncError::Timeout | SyncError::NotConnected => true,
            SyncError::AlreadyInProgress | SyncError::Protocol(_) | SyncError::Local(_) => false,
        }
    }

    /// Returns the partial result carried by a push failure.
    #[must_use]
    pub fn partial(&self) -> Option<&PartialSync> {
        match self {
            SyncError::PushFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }
}
