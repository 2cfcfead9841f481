//! Client options.

use lodestone_proto::DEFAULT_PORT;
use serde::Deserialize;

use crate::{auth::generate_client_token, error::ClientError};

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// How the client proves who it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Credentials {
    /// No authentication: the username is used verbatim
    #[default]
    Offline,
    /// Account password, exchanged for a session
    Password(String),
    /// Existing access token, refreshed into a session
    AccessToken(String),
}

/// Options for one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientOptions {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Username, or account login when authenticating
    pub username: String,
    /// Credentials, if any
    pub credentials: Credentials,
    /// Client token presented to the authentication service
    pub client_token: String,
    /// Answer server keep-alive probes
    pub keep_alive: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            credentials: Credentials::Offline,
            client_token: generate_client_token(),
            keep_alive: true,
        }
    }
}

impl ClientOptions {
    /// Offline options for `username` with every other field defaulted.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into(), ..Self::default() }
    }

    /// Set the server address.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Enable or disable keep-alive answers.
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Reject options no connection could succeed with.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.username.is_empty() {
            return Err(ClientError::InvalidOptions("username is required".to_string()));
        }
        if self.host.is_empty() {
            return Err(ClientError::InvalidOptions("host is required".to_string()));
        }
        if self.client_token.is_empty() {
            return Err(ClientError::InvalidOptions("client token is required".to_string()));
        }
        Ok(())
    }
}
