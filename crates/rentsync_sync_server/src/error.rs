//! Error types for the sync server.

use rentsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No endpoint at this path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The endpoint exists but not for this method.
    #[error("method {method} not allowed on {path}")]
    MethodNotAllowed {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Push batch over the configured limit.
    #[error("too many changes: {len} > {max}")]
    PayloadTooLarge {
        /// Entries in the request.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Body could not be decoded or encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Protocol(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::PayloadTooLarge { .. } => 413,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status() {
        assert_eq!(ServerError::InvalidRequest("bad".into()).status(), 400);
        assert_eq!(ServerError::NotFound("/x".into()).status(), 404);
        assert_eq!(ServerError::PayloadTooLarge { len: 9, max: 5 }.status(), 413);
        assert!(ServerError::NotFound("/x".into()).is_client_error());
    }

    #[test]
    fn error_display() {
        let msg = ServerError::PayloadTooLarge { len: 9, max: 5 }.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('5'));
    }
}
