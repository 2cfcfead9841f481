//! Server connection controller.
//!
//! One [`ServerSession`] per accepted connection. Pure state machine: methods
//! take the packet or timer event plus the current time and return
//! [`SessionAction`]s. The runtime owns the actual timers and transport.
//!
//! # State Machine
//!
//! ```text
//!             Handshake(1)  ┌────────┐ StatusRequest, Ping
//!          ┌───────────────>│ Status │──────────────────────> closed
//! ┌─────────────┐           └────────┘   "status complete"
//! │ Handshaking │
//! └─────────────┘           ┌───────┐  LoginStart  ┌──────┐
//!          └───────────────>│ Login │─────────────>│ Play │
//!             Handshake(2)  └───────┘              └──────┘
//!                               │ login kick           │ keep-alive stale
//!                               ↓                      ↓
//!                         "LoginTimeout"      "KeepAliveTimeout"
//! ```
//!
//! # Timers
//!
//! Accept arms the login kick. Login start cancels it and starts the
//! keep-alive interval. The two are never armed together, and
//! [`ServerSession::end`] releases whichever is left.

use std::{ops::Sub, time::Duration};

use lodestone_core::{Connection, DispatchTable};
use lodestone_proto::{KeepAlive, LoginSuccess, NextState, Packet, Pong, ProtocolState, ids};

use crate::config::SessionConfig;

/// Uuid sent in login success. Offline servers do not assign real uuids.
pub const OFFLINE_UUID: &str = "0";

/// Close reason when the login kick fires.
pub const LOGIN_TIMEOUT_REASON: &str = "LoginTimeout";

/// Close reason when the keep-alive watchdog finds the client stale.
pub const KEEP_ALIVE_TIMEOUT_REASON: &str = "KeepAliveTimeout";

/// Close reason after a status query's pong.
pub const STATUS_COMPLETE_REASON: &str = "status complete";

/// Actions returned by the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Encode and send a packet
    Send(Packet),

    /// Switch the codec's protocol state
    SetState(ProtocolState),

    /// Answer the status request with the current status document. The
    /// aggregate fills in player counts.
    RespondStatus,

    /// Arm the login-kick timer
    ArmLoginKick(Duration),

    /// Cancel the login kick and start the keep-alive interval
    StartKeepAlive(Duration),

    /// Release every timer of this session
    CancelTimers,

    /// Player finished logging in
    LoggedIn {
        /// Username from login start
        username: String,
    },

    /// A logged-in player's session ended
    LoggedOut {
        /// Username from login start
        username: String,
    },

    /// Play packet for application consumers
    Forward(Packet),

    /// Close the connection
    Close {
        /// Reason sent to the peer and logged
        reason: String,
    },
}

/// Dispatch table entries for a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionHandler {
    Handshake,
    StatusRequest,
    Ping,
    LoginStart,
    KeepAlive,
}

/// Per-connection server state machine.
///
/// Generic over `I` (instant type) so the same logic runs on real and
/// virtual time.
#[derive(Debug, Clone)]
pub struct ServerSession<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    config: SessionConfig,
    connection: Connection,
    handlers: DispatchTable<SessionHandler>,
    logged_in: bool,
    /// A close was requested; later events are ignored
    closing: bool,
    /// `end` ran
    ended: bool,
    login_kick_armed: bool,
    keep_alive_active: bool,
    last_keep_alive: Option<I>,
    last_probe_id: Option<i32>,
}

impl<I> ServerSession<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// New session for a freshly accepted connection.
    ///
    /// Returns the session and the initial actions (arm the login kick).
    pub fn accept(config: SessionConfig) -> (Self, Vec<SessionAction>) {
        let mut handlers = DispatchTable::new();
        handlers.once(
            ProtocolState::Handshaking,
            ids::handshaking::HANDSHAKE,
            SessionHandler::Handshake,
        );
        handlers.once(ProtocolState::Status, ids::status::REQUEST, SessionHandler::StatusRequest);
        handlers.once(ProtocolState::Login, ids::login::START, SessionHandler::LoginStart);

        let session = Self {
            config,
            connection: Connection::new(),
            handlers,
            logged_in: false,
            closing: false,
            ended: false,
            login_kick_armed: true,
            keep_alive_active: false,
            last_keep_alive: None,
            last_probe_id: None,
        };

        (session, vec![SessionAction::ArmLoginKick(config.kick_timeout)])
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        self.connection.state()
    }

    /// Username from login start.
    pub fn username(&self) -> Option<&str> {
        self.connection.username()
    }

    /// Whether login completed.
    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Whether `end` ran.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the login kick is armed.
    pub fn login_kick_armed(&self) -> bool {
        self.login_kick_armed
    }

    /// Whether the keep-alive watchdog runs.
    pub fn keep_alive_active(&self) -> bool {
        self.keep_alive_active
    }

    /// Time of the last liveness signal.
    pub fn last_keep_alive(&self) -> Option<I> {
        self.last_keep_alive
    }

    /// Id of the last probe sent. Responses are not matched against it.
    pub fn last_probe_id(&self) -> Option<i32> {
        self.last_probe_id
    }

    fn is_live(&self) -> bool {
        !self.closing && !self.ended
    }

    /// Process a packet from the client.
    pub fn handle_packet(&mut self, packet: Packet, now: I) -> Vec<SessionAction> {
        if !self.is_live() {
            return Vec::new();
        }

        let state = self.connection.state();
        let handlers = self.handlers.take(state, packet.id());

        if handlers.is_empty() {
            if state == ProtocolState::Play {
                return vec![SessionAction::Forward(packet)];
            }
            return self.close(format!("unexpected {} in {state}", packet.name()));
        }

        let mut actions = Vec::new();
        for handler in handlers {
            actions.extend(self.run_handler(handler, &packet, now));
            if !self.is_live() {
                break;
            }
        }
        actions
    }

    fn run_handler(
        &mut self,
        handler: SessionHandler,
        packet: &Packet,
        now: I,
    ) -> Vec<SessionAction> {
        match (handler, packet) {
            (SessionHandler::Handshake, Packet::Handshake(handshake)) => {
                let next = match handshake.intent() {
                    Ok(NextState::Status) => ProtocolState::Status,
                    Ok(NextState::Login) => ProtocolState::Login,
                    Err(e) => return self.close(e.to_string()),
                };
                match self.connection.transition(next) {
                    Ok(()) => vec![SessionAction::SetState(next)],
                    Err(e) => self.close(e.to_string()),
                }
            },
            (SessionHandler::StatusRequest, Packet::StatusRequest) => {
                self.handlers.once(ProtocolState::Status, ids::status::PING, SessionHandler::Ping);
                vec![SessionAction::RespondStatus]
            },
            (SessionHandler::Ping, Packet::Ping(ping)) => {
                let mut actions = vec![SessionAction::Send(Packet::Pong(Pong { time: ping.time }))];
                actions.extend(self.close(STATUS_COMPLETE_REASON.to_string()));
                actions
            },
            (SessionHandler::LoginStart, Packet::LoginStart(login)) => {
                self.complete_login(&login.username, now)
            },
            // Any packet with the keep-alive id counts, whatever its body
            (SessionHandler::KeepAlive, _) => {
                self.last_keep_alive = Some(now);
                Vec::new()
            },
            (_, packet) => {
                let state = self.connection.state();
                self.close(format!("unexpected {} in {state}", packet.name()))
            },
        }
    }

    fn complete_login(&mut self, username: &str, now: I) -> Vec<SessionAction> {
        if let Err(e) = self.connection.set_identity(username, OFFLINE_UUID) {
            return self.close(e.to_string());
        }
        if let Err(e) = self.connection.transition(ProtocolState::Play) {
            return self.close(e.to_string());
        }

        self.logged_in = true;
        self.login_kick_armed = false;
        self.keep_alive_active = true;
        self.last_keep_alive = Some(now);
        self.handlers.on(ProtocolState::Play, ids::play::KEEP_ALIVE, SessionHandler::KeepAlive);
        debug_assert!(!(self.login_kick_armed && self.keep_alive_active));

        vec![
            SessionAction::Send(Packet::LoginSuccess(LoginSuccess {
                uuid: OFFLINE_UUID.to_string(),
                username: username.to_string(),
            })),
            SessionAction::SetState(ProtocolState::Play),
            SessionAction::StartKeepAlive(self.config.check_interval),
            SessionAction::LoggedIn { username: username.to_string() },
        ]
    }

    /// The login kick fired.
    ///
    /// Closes with [`LOGIN_TIMEOUT_REASON`] unless login already completed
    /// or the session is ending.
    pub fn login_timer_fired(&mut self) -> Vec<SessionAction> {
        if !self.is_live() || self.logged_in || !self.login_kick_armed {
            return Vec::new();
        }
        self.login_kick_armed = false;
        self.close(LOGIN_TIMEOUT_REASON.to_string())
    }

    /// The keep-alive interval ticked.
    ///
    /// Closes with [`KEEP_ALIVE_TIMEOUT_REASON`] if more than the kick timeout
    /// passed since the last liveness signal, otherwise probes with
    /// `probe_id`.
    pub fn keep_alive_tick(&mut self, now: I, probe_id: i32) -> Vec<SessionAction> {
        if !self.is_live() || !self.keep_alive_active {
            return Vec::new();
        }

        let Some(last) = self.last_keep_alive else {
            return Vec::new();
        };

        if now - last > self.config.kick_timeout {
            return self.close(KEEP_ALIVE_TIMEOUT_REASON.to_string());
        }

        self.last_probe_id = Some(probe_id);
        vec![SessionAction::Send(Packet::KeepAlive(KeepAlive { keep_alive_id: probe_id }))]
    }

    /// End the session. Any trigger: peer close, transport error, or after a
    /// requested close.
    ///
    /// The first call releases the timers and reports a logout if the player
    /// had logged in. Later calls return nothing.
    pub fn end(&mut self) -> Vec<SessionAction> {
        if self.ended {
            return Vec::new();
        }
        self.ended = true;
        self.login_kick_armed = false;
        self.keep_alive_active = false;
        self.handlers.clear();

        let mut actions = vec![SessionAction::CancelTimers];
        if self.logged_in {
            let username = self.connection.username().unwrap_or_default().to_string();
            actions.push(SessionAction::LoggedOut { username });
        }
        actions
    }

    fn close(&mut self, reason: String) -> Vec<SessionAction> {
        self.closing = true;
        vec![SessionAction::Close { reason }]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bytes::Bytes;
    use lodestone_proto::{Handshake, LoginStart, OpaquePacket, PROTOCOL_VERSION, Ping};

    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            kick_timeout: Duration::from_millis(10_000),
            check_interval: Duration::from_millis(4_000),
        }
    }

    fn handshake(next_state: i32) -> Packet {
        Packet::Handshake(Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_host: "localhost".into(),
            server_port: 25565,
            next_state,
        })
    }

    fn login_start(username: &str) -> Packet {
        Packet::LoginStart(LoginStart { username: username.into() })
    }

    fn logged_in(now: Instant) -> ServerSession<Instant> {
        let (mut session, _) = ServerSession::accept(config());
        session.handle_packet(handshake(2), now);
        session.handle_packet(login_start("Steve"), now);
        session
    }

    #[test]
    fn accept_arms_login_kick() {
        let (session, actions) = ServerSession::<Instant>::accept(config());
        assert_eq!(actions, vec![SessionAction::ArmLoginKick(Duration::from_millis(10_000))]);
        assert!(session.login_kick_armed());
        assert!(!session.keep_alive_active());
        assert_eq!(session.state(), ProtocolState::Handshaking);
    }

    #[test]
    fn login_start_completes_login() {
        let now = Instant::now();
        let (mut session, _) = ServerSession::accept(config());

        assert_eq!(session.handle_packet(handshake(2), now), vec![SessionAction::SetState(
            ProtocolState::Login
        )]);

        let actions = session.handle_packet(login_start("Steve"), now);
        assert_eq!(actions, vec![
            SessionAction::Send(Packet::LoginSuccess(LoginSuccess {
                uuid: "0".into(),
                username: "Steve".into(),
            })),
            SessionAction::SetState(ProtocolState::Play),
            SessionAction::StartKeepAlive(Duration::from_millis(4_000)),
            SessionAction::LoggedIn { username: "Steve".into() },
        ]);
        assert!(session.is_logged_in());
        assert!(!session.login_kick_armed());
        assert!(session.keep_alive_active());
        assert_eq!(session.username(), Some("Steve"));
    }

    #[test]
    fn status_flow_answers_then_closes() {
        let now = Instant::now();
        let (mut session, _) = ServerSession::accept(config());

        session.handle_packet(handshake(1), now);
        assert_eq!(session.state(), ProtocolState::Status);

        assert_eq!(session.handle_packet(Packet::StatusRequest, now), vec![
            SessionAction::RespondStatus
        ]);

        let actions = session.handle_packet(Packet::Ping(Ping { time: 1234 }), now);
        assert_eq!(actions, vec![
            SessionAction::Send(Packet::Pong(Pong { time: 1234 })),
            SessionAction::Close { reason: "status complete".into() },
        ]);

        // Closing: nothing else is processed
        assert!(session.handle_packet(Packet::StatusRequest, now).is_empty());
    }

    #[test]
    fn ping_without_request_is_unexpected() {
        let now = Instant::now();
        let (mut session, _) = ServerSession::accept(config());
        session.handle_packet(handshake(1), now);

        let actions = session.handle_packet(Packet::Ping(Ping { time: 1 }), now);
        assert_eq!(actions, vec![SessionAction::Close {
            reason: "unexpected Ping in status".into()
        }]);
    }

    #[test]
    fn invalid_next_state_closes() {
        let (mut session, _) = ServerSession::<Instant>::accept(config());
        let actions = session.handle_packet(handshake(3), Instant::now());

        assert_eq!(actions, vec![SessionAction::Close { reason: "invalid next state 3".into() }]);
        assert_eq!(session.state(), ProtocolState::Handshaking);
    }

    #[test]
    fn login_start_before_handshake_is_unexpected() {
        let (mut session, _) = ServerSession::<Instant>::accept(config());
        let actions = session.handle_packet(login_start("Steve"), Instant::now());

        // Same (state, id) key as the handshake, wrong packet
        assert_eq!(actions, vec![SessionAction::Close {
            reason: "unexpected LoginStart in handshaking".into()
        }]);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn handshake_in_play_is_unexpected() {
        let now = Instant::now();
        let mut session = logged_in(now);

        // Shares (play, 0x00) with the keep-alive route
        let actions = session.handle_packet(handshake(2), now);
        assert_eq!(actions, vec![SessionAction::Close {
            reason: "unexpected Handshake in play".into()
        }]);
    }

    #[test]
    fn login_timer_closes_pending_login() {
        let (mut session, _) = ServerSession::<Instant>::accept(config());
        assert_eq!(session.login_timer_fired(), vec![SessionAction::Close {
            reason: "LoginTimeout".into()
        }]);
    }

    #[test]
    fn login_timer_after_login_is_ignored() {
        let mut session = logged_in(Instant::now());
        assert!(session.login_timer_fired().is_empty());
        assert!(session.is_logged_in());
    }

    #[test]
    fn keep_alive_probes_while_fresh() {
        let t0 = Instant::now();
        let mut session = logged_in(t0);

        let actions = session.keep_alive_tick(t0 + Duration::from_millis(4_000), 77);
        assert_eq!(actions, vec![SessionAction::Send(Packet::KeepAlive(KeepAlive {
            keep_alive_id: 77
        }))]);
        assert_eq!(session.last_probe_id(), Some(77));
    }

    #[test]
    fn keep_alive_threshold_is_strict() {
        let t0 = Instant::now();
        let mut session = logged_in(t0);

        // Exactly the kick timeout is still alive
        let at_limit = session.keep_alive_tick(t0 + Duration::from_millis(10_000), 1);
        assert!(matches!(at_limit.as_slice(), [SessionAction::Send(_)]));

        let past = session.keep_alive_tick(t0 + Duration::from_millis(10_001), 2);
        assert_eq!(past, vec![SessionAction::Close { reason: "KeepAliveTimeout".into() }]);
    }

    #[test]
    fn any_keep_alive_response_refreshes_liveness() {
        let t0 = Instant::now();
        let mut session = logged_in(t0);
        session.keep_alive_tick(t0 + Duration::from_millis(4_000), 5);

        // Id deliberately differs from the probe
        let response = Packet::KeepAlive(KeepAlive { keep_alive_id: 123_456 });
        let t1 = t0 + Duration::from_millis(9_000);
        assert!(session.handle_packet(response, t1).is_empty());
        assert_eq!(session.last_keep_alive(), Some(t1));

        let actions = session.keep_alive_tick(t0 + Duration::from_millis(16_000), 6);
        assert!(matches!(actions.as_slice(), [SessionAction::Send(_)]));
    }

    #[test]
    fn undecoded_keep_alive_id_refreshes_liveness() {
        let t0 = Instant::now();
        let mut session = logged_in(t0);

        let raw = Packet::Opaque(OpaquePacket {
            state: ProtocolState::Play,
            id: ids::play::KEEP_ALIVE,
            body: Bytes::from_static(&[0x01, 0x02]),
        });
        let t1 = t0 + Duration::from_millis(8_000);
        assert!(session.handle_packet(raw, t1).is_empty());
        assert!(session.is_live());
        assert_eq!(session.last_keep_alive(), Some(t1));

        let actions = session.keep_alive_tick(t0 + Duration::from_millis(16_000), 9);
        assert!(matches!(actions.as_slice(), [SessionAction::Send(_)]));
    }

    #[test]
    fn play_packets_are_forwarded() {
        let mut session = logged_in(Instant::now());
        let chat = Packet::Opaque(OpaquePacket {
            state: ProtocolState::Play,
            id: 0x01,
            body: Bytes::from_static(b"hi"),
        });
        assert_eq!(session.handle_packet(chat.clone(), Instant::now()), vec![
            SessionAction::Forward(chat)
        ]);
    }

    #[test]
    fn end_is_idempotent() {
        let mut session = logged_in(Instant::now());

        assert_eq!(session.end(), vec![SessionAction::CancelTimers, SessionAction::LoggedOut {
            username: "Steve".into()
        }]);
        assert!(session.end().is_empty());
        assert!(session.is_ended());
        assert!(!session.keep_alive_active());
    }

    #[test]
    fn end_before_login_reports_no_logout() {
        let (mut session, _) = ServerSession::<Instant>::accept(config());
        assert_eq!(session.end(), vec![SessionAction::CancelTimers]);
        assert!(session.login_timer_fired().is_empty());
        assert!(session.keep_alive_tick(Instant::now(), 1).is_empty());
    }
}
