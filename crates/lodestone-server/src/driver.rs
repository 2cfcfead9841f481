//! Server driver.
//!
//! Owns every [`ServerSession`] and the aggregate state they share: the
//! player count and the read-only configuration. Pure logic; the runtime in
//! [`crate::Server`] feeds it [`ServerEvent`]s under a single lock and
//! executes the [`ServerAction`]s it returns.

use std::collections::HashMap;

use lodestone_core::Environment;
use lodestone_proto::{Packet, ProtocolState, ServerStatus, StatusResponse};

use crate::{
    config::ServerConfig,
    error::ServerError,
    session::{ServerSession, SessionAction},
    timers::TimerKind,
};

/// Close reason for connections beyond `max_connections`.
pub const SERVER_FULL_REASON: &str = "server full";

/// Events that the server driver processes.
///
/// These are produced by the runtime (production or test harness).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A packet was received from a connection
    PacketReceived {
        /// Connection that sent the packet
        session_id: u64,
        /// The received packet
        packet: Packet,
    },

    /// One of the connection's timers fired
    TimerFired {
        /// Connection that owns the timer
        session_id: u64,
        /// Which timer
        timer: TimerKind,
    },

    /// A connection was closed (by peer, error, or a requested close)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure, if known
        reason: Option<String>,
    },
}

/// Published when a player finishes logging in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginEvent {
    /// Connection the player is on
    pub session_id: u64,
    /// Username from login start
    pub username: String,
    /// Player count including this player
    pub player_count: u32,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or test harness).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a packet to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Packet to send
        packet: Packet,
    },

    /// Switch a session's codec state
    SetState {
        /// Target session ID
        session_id: u64,
        /// New protocol state
        state: ProtocolState,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Arm the session's login kick
    ArmLoginKick {
        /// Target session ID
        session_id: u64,
        /// Time until the kick
        timeout: std::time::Duration,
    },

    /// Cancel the login kick and start the keep-alive interval
    StartKeepAlive {
        /// Target session ID
        session_id: u64,
        /// Check interval
        interval: std::time::Duration,
    },

    /// Release all of the session's timers
    CancelTimers {
        /// Target session ID
        session_id: u64,
    },

    /// A player logged in
    PlayerJoined(LoginEvent),

    /// Play packet for application consumers
    Forward {
        /// Session the packet came from
        session_id: u64,
        /// The packet
        packet: Packet,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Number of logged-in players.
///
/// Changed only through [`PlayerCount::increment`] and
/// [`PlayerCount::decrement`]; a decrement without a matching increment is
/// reported, never clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerCount(u32);

impl PlayerCount {
    /// Current value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// One more player. Returns the new count.
    pub fn increment(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    /// One player fewer. Returns the new count.
    pub fn decrement(&mut self) -> Result<u32, ServerError> {
        self.0 = self.0.checked_sub(1).ok_or(ServerError::PlayerCountUnderflow)?;
        Ok(self.0)
    }
}

/// Action-based server driver.
pub struct ServerDriver<E: Environment> {
    sessions: HashMap<u64, ServerSession<E::Instant>>,
    player_count: PlayerCount,
    env: E,
    config: ServerConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { sessions: HashMap::new(), player_count: PlayerCount::default(), env, config }
    }

    /// Logged-in players.
    pub fn player_count(&self) -> u32 {
        self.player_count.get()
    }

    /// Open sessions, logged in or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Session state for `session_id`.
    pub fn session(&self, session_id: u64) -> Option<&ServerSession<E::Instant>> {
        self.sessions.get(&session_id)
    }

    /// Active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::PacketReceived { session_id, packet } => {
                self.handle_packet_received(session_id, packet)
            },
            ServerEvent::TimerFired { session_id, timer } => {
                self.handle_timer_fired(session_id, timer)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                self.handle_connection_closed(session_id, reason.as_deref())
            },
        }
    }

    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.sessions.contains_key(&session_id) {
            return Err(ServerError::SessionAlreadyExists(session_id));
        }

        if self.sessions.len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    session_id,
                    reason: SERVER_FULL_REASON.to_string(),
                },
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "connection {session_id} rejected: {} connections open",
                        self.sessions.len()
                    ),
                },
            ]);
        }

        let (session, session_actions) = ServerSession::accept(self.config.session());
        self.sessions.insert(session_id, session);

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {session_id} accepted"),
        }];
        actions.extend(self.convert_session_actions(session_id, session_actions)?);
        Ok(actions)
    }

    fn handle_packet_received(
        &mut self,
        session_id: u64,
        packet: Packet,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();
        let session =
            self.sessions.get_mut(&session_id).ok_or(ServerError::SessionNotFound(session_id))?;

        let session_actions = session.handle_packet(packet, now);
        self.convert_session_actions(session_id, session_actions)
    }

    fn handle_timer_fired(
        &mut self,
        session_id: u64,
        timer: TimerKind,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let now = self.env.now();
        // A timer racing the close of its session has nothing left to do
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return Ok(Vec::new());
        };

        let session_actions = match timer {
            TimerKind::LoginKick => session.login_timer_fired(),
            TimerKind::KeepAlive => session.keep_alive_tick(now, self.env.random_keep_alive_id()),
        };
        self.convert_session_actions(session_id, session_actions)
    }

    fn handle_connection_closed(
        &mut self,
        session_id: u64,
        reason: Option<&str>,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let Some(mut session) = self.sessions.remove(&session_id) else {
            return Ok(Vec::new());
        };

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "connection {session_id} closed in {}: {}",
                session.state(),
                reason.unwrap_or("no reason")
            ),
        }];
        let session_actions = session.end();
        actions.extend(self.convert_session_actions(session_id, session_actions)?);
        Ok(actions)
    }

    /// Map session actions to server actions, applying aggregate effects.
    fn convert_session_actions(
        &mut self,
        session_id: u64,
        session_actions: Vec<SessionAction>,
    ) -> Result<Vec<ServerAction>, ServerError> {
        let mut actions = Vec::with_capacity(session_actions.len());

        for action in session_actions {
            match action {
                SessionAction::Send(packet) => {
                    actions.push(ServerAction::SendToSession { session_id, packet });
                },
                SessionAction::SetState(state) => {
                    actions.push(ServerAction::SetState { session_id, state });
                },
                SessionAction::RespondStatus => {
                    actions.extend(self.status_response(session_id));
                },
                SessionAction::ArmLoginKick(timeout) => {
                    actions.push(ServerAction::ArmLoginKick { session_id, timeout });
                },
                SessionAction::StartKeepAlive(interval) => {
                    actions.push(ServerAction::StartKeepAlive { session_id, interval });
                },
                SessionAction::CancelTimers => {
                    actions.push(ServerAction::CancelTimers { session_id });
                },
                SessionAction::LoggedIn { username } => {
                    let player_count = self.player_count.increment();
                    actions.push(ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "{username} logged in on connection {session_id} \
                             ({player_count}/{} players)",
                            self.config.max_players
                        ),
                    });
                    actions.push(ServerAction::PlayerJoined(LoginEvent {
                        session_id,
                        username,
                        player_count,
                    }));
                },
                SessionAction::LoggedOut { username } => {
                    let player_count = self.player_count.decrement()?;
                    actions.push(ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "{username} left ({player_count}/{} players)",
                            self.config.max_players
                        ),
                    });
                },
                SessionAction::Forward(packet) => {
                    actions.push(ServerAction::Forward { session_id, packet });
                },
                SessionAction::Close { reason } => {
                    actions.push(ServerAction::CloseConnection { session_id, reason });
                },
            }
        }

        Ok(actions)
    }

    fn status_response(&self, session_id: u64) -> Vec<ServerAction> {
        let status = ServerStatus::new(
            self.config.motd.clone(),
            self.player_count.get(),
            self.config.max_players,
            self.config.favicon.clone(),
        );

        match status.to_json() {
            Ok(response) => vec![ServerAction::SendToSession {
                session_id,
                packet: Packet::StatusResponse(StatusResponse { response }),
            }],
            Err(e) => vec![
                ServerAction::Log {
                    level: LogLevel::Error,
                    message: format!("status document for connection {session_id} failed: {e}"),
                },
                ServerAction::CloseConnection { session_id, reason: "internal error".to_string() },
            ],
        }
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("session_count", &self.sessions.len())
            .field("player_count", &self.player_count.get())
            .finish_non_exhaustive()
    }
}
