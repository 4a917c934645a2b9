//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// A frame in the middle of a log failed validation.
    #[error("log corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the offending frame.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A frame payload exceeded what the length field can describe.
    #[error("frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    /// A write was attempted on a log opened read-only.
    #[error("log is opened read-only")]
    ReadOnly,
}

impl StorageError {
    /// Creates a corruption error for the frame at `offset`.
    pub fn corrupted(offset: u64, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            reason: reason.into(),
        }
    }
}
