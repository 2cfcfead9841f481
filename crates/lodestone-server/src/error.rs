//! Server error types.

use lodestone_core::{ConnectionError, TransportError};
use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerError {
    /// Session not found in the driver.
    ///
    /// An event named a session that was never accepted or has already been
    /// closed. Packets racing a close hit this; the runtime drops them.
    #[error("session {0} not found")]
    SessionNotFound(u64),

    /// Session id already in use.
    ///
    /// The runtime allocated a duplicate id. This is a logic bug.
    #[error("session {0} already exists")]
    SessionAlreadyExists(u64),

    /// Transport/network error (listener failure, I/O error, etc.).
    ///
    /// May be transient or fatal for the listener. Fatal for a single
    /// connection, never for the server.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error (zero timeouts, empty bind host, etc.).
    ///
    /// Prevents server startup. Fix the configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Lifecycle violation on one connection.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Player count would drop below zero.
    ///
    /// A decrement without a matching increment. Indicates a bug in session
    /// bookkeeping.
    #[error("player count underflow")]
    PlayerCountUnderflow,
}
