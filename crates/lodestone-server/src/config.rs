//! Server configuration.
//!
//! Field names follow the classic server option names (`kickTimeout`,
//! `checkTimeoutInterval`, `maxPlayers`, ...), durations in milliseconds, so a
//! config file written for those options loads unchanged.

use std::time::Duration;

use lodestone_proto::DEFAULT_PORT;
use serde::Deserialize;

use crate::error::ServerError;

/// Interface the listener binds to by default.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Time allowed between accept and login start, and the keep-alive
/// staleness limit.
pub const DEFAULT_KICK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Interval between keep-alive checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(4_000);

/// Player capacity advertised in status responses.
pub const DEFAULT_MAX_PLAYERS: u32 = 20;

/// Message of the day.
pub const DEFAULT_MOTD: &str = "A Minecraft server";

/// Maximum concurrent connections, logged in or not.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Login deadline and keep-alive staleness limit
    #[serde(with = "lodestone_core::duration_ms")]
    pub kick_timeout: Duration,
    /// Keep-alive check interval
    #[serde(with = "lodestone_core::duration_ms")]
    pub check_timeout_interval: Duration,
    /// Whether players must authenticate with the session service.
    ///
    /// Carried and reported only; encryption and session verification need
    /// a codec that supports them.
    pub online_mode: bool,
    /// Message of the day
    pub motd: String,
    /// Capacity advertised in status responses
    pub max_players: u32,
    /// Favicon as a PNG data URI
    pub favicon: Option<String>,
    /// Connections beyond this are closed on accept
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            kick_timeout: DEFAULT_KICK_TIMEOUT,
            check_timeout_interval: DEFAULT_CHECK_INTERVAL,
            online_mode: true,
            motd: DEFAULT_MOTD.to_string(),
            max_players: DEFAULT_MAX_PLAYERS,
            favicon: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-session slice of the configuration.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            kick_timeout: self.kick_timeout,
            check_interval: self.check_timeout_interval,
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.kick_timeout.is_zero() {
            return Err(ServerError::Config("kickTimeout must be positive".to_string()));
        }
        if self.check_timeout_interval.is_zero() {
            return Err(ServerError::Config("checkTimeoutInterval must be positive".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ServerError::Config("maxConnections must be positive".to_string()));
        }
        Ok(())
    }
}

/// Timing a single session needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Login deadline and keep-alive staleness limit
    pub kick_timeout: Duration,
    /// Keep-alive check interval
    pub check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session()
    }
}
