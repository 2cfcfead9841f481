//! Error types for the Lodestone core.
//!
//! Connection errors cover lifecycle violations (illegal state transitions,
//! packets outside their state, bad handshakes). Transport errors cover the
//! collaborator behind [`crate::transport::PacketStream`].
//!
//! Login and keep-alive timeouts are not errors: the session closes with a
//! reason string instead.

use std::io;

use lodestone_proto::{ProtocolError, ProtocolState};
use thiserror::Error;

/// Errors raised by the connection lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// State transition not allowed by the lifecycle
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: ProtocolState,
        /// Requested state
        to: ProtocolState,
    },

    /// Packet arrived in a state where nothing handles it
    #[error("unexpected {packet} (id {id:#04x}) in state {state}")]
    UnexpectedPacket {
        /// State when the packet arrived
        state: ProtocolState,
        /// Packet name
        packet: &'static str,
        /// Packet id
        id: u8,
    },

    /// Identity (username/uuid) was already fixed for this connection
    #[error("identity already set to {username}")]
    IdentityAlreadySet {
        /// Username already recorded
        username: String,
    },

    /// Compression was already negotiated
    #[error("compression already negotiated (threshold {threshold})")]
    CompressionAlreadyNegotiated {
        /// Threshold already in effect
        threshold: i32,
    },

    /// Handshake requested a next state other than status or login
    #[error("invalid next state {0}")]
    InvalidNextState(i32),

    /// Packet content rejected
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Returns true if this error is transient and a fresh connection may
    /// succeed.
    ///
    /// Lifecycle violations are never transient: they indicate a broken or
    /// malicious peer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors reported by a packet transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer or the local side closed the connection
    #[error("connection closed")]
    Closed,

    /// Socket-level failure
    #[error("i/o error: {0}")]
    Io(String),

    /// Bytes could not be framed or decoded
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<ProtocolError> for ConnectionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidNextState(value) => Self::InvalidNextState(value),
            other => Self::Protocol(other),
        }
    }
}

impl From<TransportError> for ConnectionError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}
