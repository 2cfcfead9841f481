//! Per-connection lifecycle record.
//!
//! Shared by the client and server controllers. Tracks the protocol state,
//! the player identity once login settles it, and the negotiated compression
//! threshold. Every mutation is checked: transitions must follow the
//! lifecycle graph, identity and compression are fixed at most once.

use lodestone_proto::ProtocolState;

use crate::error::ConnectionError;

/// Negotiated compression settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    /// Minimum body size that gets compressed
    pub threshold: i32,
}

/// Lifecycle state of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    state: ProtocolState,
    username: Option<String>,
    uuid: Option<String>,
    compression: Option<Compression>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Fresh connection in [`ProtocolState::Handshaking`].
    pub fn new() -> Self {
        Self { state: ProtocolState::Handshaking, username: None, uuid: None, compression: None }
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// Username, once known.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Player uuid, once login succeeded.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Negotiated compression, if any.
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless `to` is a legal successor of the current
    /// state. Re-entering the current state is also rejected.
    pub fn transition(&mut self, to: ProtocolState) -> Result<(), ConnectionError> {
        if !self.state.can_transition_to(to) {
            return Err(ConnectionError::InvalidTransition { from: self.state, to });
        }

        tracing::trace!(from = %self.state, to = %to, "protocol state transition");
        self.state = to;
        Ok(())
    }

    /// Record the username requested or corrected before login completes.
    ///
    /// Overwrites a previous username as long as no uuid has been assigned.
    pub fn set_username(&mut self, username: impl Into<String>) -> Result<(), ConnectionError> {
        if let (Some(existing), Some(_)) = (&self.username, &self.uuid) {
            return Err(ConnectionError::IdentityAlreadySet { username: existing.clone() });
        }
        self.username = Some(username.into());
        Ok(())
    }

    /// Fix the final identity assigned by login success.
    ///
    /// # Errors
    ///
    /// `IdentityAlreadySet` if a uuid was already assigned.
    pub fn set_identity(
        &mut self,
        username: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Result<(), ConnectionError> {
        if self.uuid.is_some() {
            return Err(ConnectionError::IdentityAlreadySet {
                username: self.username.clone().unwrap_or_default(),
            });
        }
        self.username = Some(username.into());
        self.uuid = Some(uuid.into());
        Ok(())
    }

    /// Enable compression at `threshold`.
    ///
    /// # Errors
    ///
    /// `CompressionAlreadyNegotiated` on a second call.
    pub fn enable_compression(&mut self, threshold: i32) -> Result<(), ConnectionError> {
        if let Some(existing) = self.compression {
            return Err(ConnectionError::CompressionAlreadyNegotiated {
                threshold: existing.threshold,
            });
        }
        self.compression = Some(Compression { threshold });
        Ok(())
    }
}
