//! Client session controller.
//!
//! Drives one outbound connection: optional authentication, then
//! handshake, login start, optional compression switch, and play. Takes
//! [`ClientEvent`]s and returns [`ClientAction`]s; the runtime in
//! [`crate::runtime`] executes them.
//!
//! # Lifecycle
//!
//! ```text
//! ┌──────┐ credentials ┌────────────────┐ SessionAcquired ┌────────────┐
//! │ Idle │────────────>│ Authenticating │────────────────>│ Connecting │
//! └──────┘             └────────────────┘                 └────────────┘
//!    │ offline                 │ AuthenticationFailed        ↑    │ Connected
//!    └─────────────────────────┼─────────────────────────────┘    ↓
//!                              ↓                           ┌────────────┐
//!                          ┌───────┐     Disconnected      │ Connected  │
//!                          │ Ended │<──────────────────────│ login/play │
//!                          └───────┘                       └────────────┘
//! ```

use lodestone_core::{Connection, DispatchTable};
use lodestone_proto::{
    Handshake, LoginStart, NextState, PROTOCOL_VERSION, Packet, ProtocolState, ids,
};

use crate::{
    auth::Session,
    error::ClientError,
    event::{ClientAction, ClientEvent, KEEP_ALIVE_RESPONSE},
    options::{ClientOptions, Credentials},
};

/// Handlers the client registers in its dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientHandler {
    LoginSuccess,
    SetCompression,
    KeepAlive,
}

/// Coarse progress of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    /// Not started
    Idle,
    /// Waiting for the gateway
    Authenticating,
    /// Waiting for the transport
    Connecting,
    /// Transport open; see [`Client::state`] for the protocol state
    Connected,
    /// Finished, successfully or not
    Ended,
}

/// Sans-IO client for one connection.
#[derive(Debug)]
pub struct Client {
    options: ClientOptions,
    phase: ClientPhase,
    connection: Connection,
    session: Option<Session>,
    handlers: DispatchTable<ClientHandler>,
}

impl Client {
    /// Create a client. Fails if the options are unusable.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        options.validate()?;

        let mut handlers = DispatchTable::new();
        handlers.once(ProtocolState::Login, ids::login::SUCCESS, ClientHandler::LoginSuccess);
        handlers.once(
            ProtocolState::Login,
            ids::login::SET_COMPRESSION,
            ClientHandler::SetCompression,
        );
        if options.keep_alive {
            handlers.on(ProtocolState::Play, ids::play::KEEP_ALIVE, ClientHandler::KeepAlive);
        }

        Ok(Self {
            options,
            phase: ClientPhase::Idle,
            connection: Connection::new(),
            session: None,
            handlers,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    /// Current protocol state.
    pub fn state(&self) -> ProtocolState {
        self.connection.state()
    }

    /// Username: as configured, then case-corrected by the session, then as
    /// confirmed by login success.
    pub fn username(&self) -> &str {
        self.connection.username().unwrap_or(&self.options.username)
    }

    /// Player uuid once logged in.
    pub fn uuid(&self) -> Option<&str> {
        self.connection.uuid()
    }

    /// Negotiated compression threshold.
    pub fn compression_threshold(&self) -> Option<i32> {
        self.connection.compression().map(|c| c.threshold)
    }

    /// Session from the gateway, when credentials were used.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Options the client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Begin: authenticate when credentials are present, else connect.
    pub fn start(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.phase != ClientPhase::Idle {
            return Err(ClientError::AlreadyStarted);
        }

        let (credential, is_token) = match &self.options.credentials {
            Credentials::Offline => {
                self.connection.set_username(self.options.username.clone())?;
                self.phase = ClientPhase::Connecting;
                return Ok(vec![self.connect_action()]);
            },
            Credentials::Password(password) => (password.clone(), false),
            Credentials::AccessToken(token) => (token.clone(), true),
        };

        self.phase = ClientPhase::Authenticating;
        Ok(vec![ClientAction::Authenticate {
            username: self.options.username.clone(),
            credential,
            client_token: self.options.client_token.clone(),
            is_token,
        }])
    }

    /// Process an event.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        if self.phase == ClientPhase::Ended {
            return Ok(Vec::new());
        }

        match event {
            ClientEvent::SessionAcquired(session) => self.handle_session(session),
            ClientEvent::AuthenticationFailed(err) => {
                self.finish();
                Err(ClientError::Authentication(err))
            },
            ClientEvent::Connected => self.handle_connected(),
            ClientEvent::PacketReceived(packet) => self.handle_packet(packet),
            ClientEvent::Disconnected { reason } => {
                self.finish();
                Ok(vec![ClientAction::Ended { reason }])
            },
        }
    }

    fn handle_session(&mut self, session: Session) -> Result<Vec<ClientAction>, ClientError> {
        if self.phase != ClientPhase::Authenticating {
            tracing::warn!(phase = ?self.phase, "session arrived outside authentication");
            return Ok(Vec::new());
        }

        self.connection.set_username(session.username.clone())?;
        self.session = Some(session.clone());
        self.phase = ClientPhase::Connecting;

        Ok(vec![ClientAction::SessionReady(session), self.connect_action()])
    }

    fn handle_connected(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.phase != ClientPhase::Connecting {
            tracing::warn!(phase = ?self.phase, "transport connected outside connecting phase");
            return Ok(Vec::new());
        }
        self.phase = ClientPhase::Connected;

        let handshake = Handshake::new(
            PROTOCOL_VERSION,
            self.options.host.clone(),
            self.options.port,
            NextState::Login,
        );
        self.connection.transition(ProtocolState::Login)?;

        Ok(vec![
            ClientAction::Send(Packet::Handshake(handshake)),
            ClientAction::SetState(ProtocolState::Login),
            ClientAction::Send(Packet::LoginStart(LoginStart {
                username: self.username().to_string(),
            })),
        ])
    }

    fn handle_packet(&mut self, packet: Packet) -> Result<Vec<ClientAction>, ClientError> {
        if self.phase != ClientPhase::Connected {
            return Ok(vec![ClientAction::Unhandled(packet)]);
        }

        let handlers = self.handlers.take(self.connection.state(), packet.id());
        if handlers.is_empty() {
            return Ok(vec![ClientAction::Unhandled(packet)]);
        }

        let mut actions = Vec::new();
        for handler in handlers {
            match (handler, &packet) {
                (ClientHandler::LoginSuccess, Packet::LoginSuccess(success)) => {
                    self.connection.set_identity(success.username.clone(), success.uuid.clone())?;
                    self.connection.transition(ProtocolState::Play)?;
                    actions.push(ClientAction::SetState(ProtocolState::Play));
                    actions.push(ClientAction::LoggedIn {
                        username: success.username.clone(),
                        uuid: success.uuid.clone(),
                    });
                },
                (ClientHandler::SetCompression, Packet::SetCompression(compression)) => {
                    self.connection.enable_compression(compression.threshold)?;
                    actions
                        .push(ClientAction::EnableCompression { threshold: compression.threshold });
                },
                (ClientHandler::KeepAlive, _) => {
                    actions.push(ClientAction::SendRaw(KEEP_ALIVE_RESPONSE.to_vec()));
                },
                (handler, packet) => {
                    tracing::debug!(?handler, packet = packet.name(), "handler did not match packet");
                    actions.push(ClientAction::Unhandled(packet.clone()));
                },
            }
        }

        Ok(actions)
    }

    fn connect_action(&self) -> ClientAction {
        ClientAction::Connect { host: self.options.host.clone(), port: self.options.port }
    }

    fn finish(&mut self) {
        self.phase = ClientPhase::Ended;
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use lodestone_proto::{KeepAlive, LoginSuccess, OpaquePacket, SetCompression};

    use super::*;
    use crate::auth::AuthError;

    fn offline(username: &str) -> Client {
        Client::new(ClientOptions::new(username)).unwrap()
    }

    fn login_success(username: &str) -> Packet {
        Packet::LoginSuccess(LoginSuccess { uuid: "0".into(), username: username.into() })
    }

    fn connected(username: &str) -> Client {
        let mut client = offline(username);
        client.start().unwrap();
        client.handle(ClientEvent::Connected).unwrap();
        client
    }

    #[test]
    fn offline_start_connects_directly() {
        let mut client = offline("Steve");
        let actions = client.start().unwrap();

        assert_eq!(actions, vec![ClientAction::Connect { host: "localhost".into(), port: 25565 }]);
        assert_eq!(client.phase(), ClientPhase::Connecting);
        assert_eq!(client.username(), "Steve");
    }

    #[test]
    fn connected_sends_handshake_then_login_start() {
        let mut client = offline("Steve");
        client.start().unwrap();
        let actions = client.handle(ClientEvent::Connected).unwrap();

        assert_eq!(actions, vec![
            ClientAction::Send(Packet::Handshake(Handshake {
                protocol_version: PROTOCOL_VERSION,
                server_host: "localhost".into(),
                server_port: 25565,
                next_state: 2,
            })),
            ClientAction::SetState(ProtocolState::Login),
            ClientAction::Send(Packet::LoginStart(LoginStart { username: "Steve".into() })),
        ]);
        assert_eq!(client.state(), ProtocolState::Login);
    }

    #[test]
    fn login_success_enters_play() {
        let mut client = connected("Steve");
        let actions = client.handle(ClientEvent::PacketReceived(login_success("Steve"))).unwrap();

        assert_eq!(actions, vec![
            ClientAction::SetState(ProtocolState::Play),
            ClientAction::LoggedIn { username: "Steve".into(), uuid: "0".into() },
        ]);
        assert_eq!(client.state(), ProtocolState::Play);
        assert_eq!(client.uuid(), Some("0"));
    }

    #[test]
    fn set_compression_fires_once() {
        let mut client = connected("Steve");
        let packet = Packet::SetCompression(SetCompression { threshold: 256 });

        let first = client.handle(ClientEvent::PacketReceived(packet.clone())).unwrap();
        assert_eq!(first, vec![ClientAction::EnableCompression { threshold: 256 }]);
        assert_eq!(client.compression_threshold(), Some(256));

        let second = client.handle(ClientEvent::PacketReceived(packet.clone())).unwrap();
        assert_eq!(second, vec![ClientAction::Unhandled(packet)]);
    }

    #[test]
    fn keep_alive_answers_with_raw_bytes() {
        let mut client = connected("Steve");
        client.handle(ClientEvent::PacketReceived(login_success("Steve"))).unwrap();

        for id in [1, 99] {
            let probe = Packet::KeepAlive(KeepAlive { keep_alive_id: id });
            let actions = client.handle(ClientEvent::PacketReceived(probe)).unwrap();
            assert_eq!(actions, vec![ClientAction::SendRaw(vec![0x03, 0x00, 0x03, 0x01])]);
        }
    }

    #[test]
    fn keep_alive_can_be_disabled() {
        let options = ClientOptions::new("Steve").with_keep_alive(false);
        let mut client = Client::new(options).unwrap();
        client.start().unwrap();
        client.handle(ClientEvent::Connected).unwrap();
        client.handle(ClientEvent::PacketReceived(login_success("Steve"))).unwrap();

        let probe = Packet::KeepAlive(KeepAlive { keep_alive_id: 7 });
        let actions = client.handle(ClientEvent::PacketReceived(probe.clone())).unwrap();
        assert_eq!(actions, vec![ClientAction::Unhandled(probe)]);
    }

    #[test]
    fn play_traffic_goes_to_the_application() {
        let mut client = connected("Steve");
        client.handle(ClientEvent::PacketReceived(login_success("Steve"))).unwrap();

        let chat = Packet::Opaque(OpaquePacket {
            state: ProtocolState::Play,
            id: 0x02,
            body: Bytes::from_static(b"hello"),
        });
        let actions = client.handle(ClientEvent::PacketReceived(chat.clone())).unwrap();
        assert_eq!(actions, vec![ClientAction::Unhandled(chat)]);
    }

    #[test]
    fn credentials_authenticate_before_connecting() {
        let options = ClientOptions::new("steve@example.com")
            .with_credentials(Credentials::Password("hunter2".into()));
        let token = options.client_token.clone();
        let mut client = Client::new(options).unwrap();

        let actions = client.start().unwrap();
        assert_eq!(actions, vec![ClientAction::Authenticate {
            username: "steve@example.com".into(),
            credential: "hunter2".into(),
            client_token: token,
            is_token: false,
        }]);
        assert_eq!(client.phase(), ClientPhase::Authenticating);

        // Connected before a session is a no-op
        assert!(client.handle(ClientEvent::Connected).unwrap().is_empty());
        assert_eq!(client.state(), ProtocolState::Handshaking);
    }

    #[test]
    fn session_adopts_case_corrected_username() {
        let options =
            ClientOptions::new("steve").with_credentials(Credentials::AccessToken("tok".into()));
        let mut client = Client::new(options).unwrap();
        client.start().unwrap();

        let session = Session {
            username: "Steve".into(),
            access_token: "fresh".into(),
            client_token: "client".into(),
            selected_profile: None,
        };
        let actions = client.handle(ClientEvent::SessionAcquired(session.clone())).unwrap();

        assert_eq!(actions, vec![
            ClientAction::SessionReady(session),
            ClientAction::Connect { host: "localhost".into(), port: 25565 },
        ]);
        assert_eq!(client.username(), "Steve");
    }

    #[test]
    fn authentication_failure_ends_without_connect() {
        let options =
            ClientOptions::new("steve").with_credentials(Credentials::Password("bad".into()));
        let mut client = Client::new(options).unwrap();
        client.start().unwrap();

        let err = AuthError::Rejected { status: 403, message: "Invalid credentials.".into() };
        let result = client.handle(ClientEvent::AuthenticationFailed(err.clone()));
        assert_eq!(result, Err(ClientError::Authentication(err)));
        assert_eq!(client.phase(), ClientPhase::Ended);

        assert!(client.handle(ClientEvent::Connected).unwrap().is_empty());
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut client = offline("Steve");
        client.start().unwrap();
        assert_eq!(client.start(), Err(ClientError::AlreadyStarted));
    }

    #[test]
    fn disconnect_ends_once() {
        let mut client = connected("Steve");
        let actions = client.handle(ClientEvent::Disconnected { reason: Some("bye".into()) });
        assert_eq!(actions.unwrap(), vec![ClientAction::Ended { reason: Some("bye".into()) }]);

        let again = client.handle(ClientEvent::Disconnected { reason: None }).unwrap();
        assert!(again.is_empty());
    }
}
