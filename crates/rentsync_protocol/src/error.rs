//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A query string could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}
