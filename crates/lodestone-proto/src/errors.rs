//! Protocol errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while interpreting lifecycle packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Handshake declared a next state other than status (1) or login (2).
    #[error("invalid next state {0}")]
    InvalidNextState(i32),

    /// Status response did not contain a valid status document.
    #[error("malformed status document: {0}")]
    MalformedStatus(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedStatus(err.to_string())
    }
}
