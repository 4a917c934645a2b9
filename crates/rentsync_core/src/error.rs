//! Error types for rentsync core.

use rentsync_protocol::{RecordId, Revision};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in replica operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] rentsync_storage::StorageError),

    /// Encoding or decoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] rentsync_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record not found.
    #[error("record not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: RecordId,
    },

    /// The collection is not part of the schema.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// A payload does not match the collection schema.
    #[error("schema violation in {collection}.{column}: {message}")]
    SchemaViolation {
        /// Collection being written.
        collection: String,
        /// Offending column.
        column: String,
        /// What was wrong.
        message: String,
    },

    /// A checkpoint write tried to move backwards.
    #[error("checkpoint regression: current {current}, attempted {attempted}")]
    CheckpointRegression {
        /// Stored checkpoint.
        current: Revision,
        /// Rejected value.
        attempted: Revision,
    },

    /// Another process holds the replica directory.
    #[error("replica locked: another process has exclusive access")]
    ReplicaLocked,

    /// The replica directory or one of its files is invalid.
    #[error("invalid replica format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(id: &RecordId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a schema violation error.
    pub fn schema_violation(
        collection: &str,
        column: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            collection: collection.to_string(),
            column: column.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = CoreError::not_found(&RecordId::from("car1"));
        assert_eq!(err.to_string(), "record not found: car1");

        let err = CoreError::CheckpointRegression {
            current: 9,
            attempted: 4,
        };
        assert!(err.to_string().contains("current 9"));

        let err = CoreError::schema_violation("cars", "price", "expected number");
        assert_eq!(
            err.to_string(),
            "schema violation in cars.price: expected number"
        );
    }
}
