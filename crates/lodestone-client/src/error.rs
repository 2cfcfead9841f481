//! Client error types.

use std::time::Duration;

use lodestone_core::{ConnectionError, TransportError};
use lodestone_proto::ProtocolError;
use thiserror::Error;

use crate::auth::AuthError;

/// Errors surfaced by the client controller, runtime and status query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The gateway refused or failed to produce a session
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Lifecycle violation on the connection
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Options rejected before anything started
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Operation did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// `start` called more than once
    #[error("client already started")]
    AlreadyStarted,
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::Connection(err.into())
    }
}
