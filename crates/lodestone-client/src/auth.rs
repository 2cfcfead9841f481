//! Authentication gateway contract.
//!
//! The client controller trades credentials for a [`Session`] through an
//! [`AuthGateway`] before it opens any connection. [`crate::Yggdrasil`] talks
//! to the real HTTP service; tests plug in a scripted gateway.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Authentication failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Request never got an answer (DNS, TLS, connection reset, timeout)
    #[error("authentication service unreachable: {0}")]
    Network(String),

    /// Service answered with a non-success status
    #[error("authentication rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Error message reported by the service
        message: String,
    },

    /// Service answered with a body we could not understand
    #[error("invalid authentication response: {0}")]
    InvalidResponse(String),
}

/// Game profile attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    /// Profile uuid without dashes
    pub id: String,
    /// Case-correct player name
    pub name: String,
}

/// Authenticated session returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Case-corrected username
    pub username: String,
    /// Token presented to the session service
    pub access_token: String,
    /// Client token the session is bound to
    pub client_token: String,
    /// Selected profile, when the account has one
    pub selected_profile: Option<Profile>,
}

/// Credential exchange with the authentication service.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Exchange credentials for a session.
    ///
    /// `credential` is a password, or an access token to refresh when
    /// `is_token` is set.
    async fn acquire_session(
        &self,
        username: &str,
        credential: &str,
        client_token: &str,
        is_token: bool,
    ) -> Result<Session, AuthError>;

    /// Check that `access_token` is still accepted.
    async fn validate_session(&self, access_token: &str) -> Result<(), AuthError>;

    /// Tell the session service that the profile is joining the server
    /// identified by `server_hash` (see [`lodestone_core::server_hash`]).
    async fn join_server(
        &self,
        access_token: &str,
        profile_id: &str,
        server_hash: &str,
    ) -> Result<(), AuthError>;
}

/// Fresh random client token (UUID v4, hyphenated).
pub fn generate_client_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tokens_are_unique_uuids() {
        let first = generate_client_token();
        let second = generate_client_token();

        assert_ne!(first, second);
        let parsed = uuid::Uuid::parse_str(&first).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn rejection_message_is_displayed() {
        let err = AuthError::Rejected { status: 403, message: "Invalid credentials.".into() };
        assert_eq!(err.to_string(), "authentication rejected (403): Invalid credentials.");
    }
}
