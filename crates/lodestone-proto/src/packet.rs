//! Lifecycle packets.
//!
//! Each variant of [`Packet`] maps to exactly one `(state, id)` pair for the
//! direction it travels in. Play traffic other than the keep-alive is carried
//! as [`OpaquePacket`] so the lifecycle layer can route it without
//! understanding it.

use bytes::Bytes;

use crate::{
    errors::Result,
    state::{NextState, ProtocolState},
};

/// Packet ids, grouped by protocol state.
pub mod ids {
    /// Handshaking state ids.
    pub mod handshaking {
        /// Serverbound handshake
        pub const HANDSHAKE: u8 = 0x00;
    }

    /// Status state ids.
    pub mod status {
        /// Serverbound status request
        pub const REQUEST: u8 = 0x00;
        /// Clientbound status response
        pub const RESPONSE: u8 = 0x00;
        /// Serverbound ping
        pub const PING: u8 = 0x01;
        /// Clientbound pong
        pub const PONG: u8 = 0x01;
    }

    /// Login state ids.
    pub mod login {
        /// Serverbound login start
        pub const START: u8 = 0x00;
        /// Clientbound login success
        pub const SUCCESS: u8 = 0x02;
        /// Clientbound set compression
        pub const SET_COMPRESSION: u8 = 0x03;
    }

    /// Play state ids.
    pub mod play {
        /// Keep-alive, both directions
        pub const KEEP_ALIVE: u8 = 0x00;
    }
}

/// Handshake: protocol version, target address and the requested next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Client protocol version
    pub protocol_version: i32,
    /// Host the client used to connect
    pub server_host: String,
    /// Port the client used to connect
    pub server_port: u16,
    /// Raw next-state value (1 = status, 2 = login)
    pub next_state: i32,
}

impl Handshake {
    /// Build a handshake requesting `next_state`.
    pub fn new(
        protocol_version: i32,
        server_host: impl Into<String>,
        server_port: u16,
        next_state: NextState,
    ) -> Self {
        Self {
            protocol_version,
            server_host: server_host.into(),
            server_port,
            next_state: next_state.to_i32(),
        }
    }

    /// Decoded next-state intent. Fails for values other than 1 and 2.
    pub fn intent(&self) -> Result<NextState> {
        NextState::try_from(self.next_state)
    }
}

/// Status response carrying a JSON status document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Serialized [`crate::ServerStatus`]
    pub response: String,
}

/// Status ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    /// Client-chosen timestamp, echoed back verbatim
    pub time: i64,
}

/// Status pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    /// Timestamp copied from the ping
    pub time: i64,
}

/// Login start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    /// Requested username
    pub username: String,
}

/// Login success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Player uuid as sent by the server
    pub uuid: String,
    /// Final username
    pub username: String,
}

/// Set compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompression {
    /// Minimum packet size that gets compressed
    pub threshold: i32,
}

/// Keep-alive probe (clientbound) or response (serverbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Probe identifier
    pub keep_alive_id: i32,
}

/// Packet the lifecycle layer routes but does not interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaquePacket {
    /// State the packet was decoded in
    pub state: ProtocolState,
    /// Packet id
    pub id: u8,
    /// Undecoded body
    pub body: Bytes,
}

/// All decoded packets the lifecycle layer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Handshaking: handshake
    Handshake(Handshake),
    /// Status: request
    StatusRequest,
    /// Status: response
    StatusResponse(StatusResponse),
    /// Status: ping
    Ping(Ping),
    /// Status: pong
    Pong(Pong),
    /// Login: start
    LoginStart(LoginStart),
    /// Login: success
    LoginSuccess(LoginSuccess),
    /// Login: set compression
    SetCompression(SetCompression),
    /// Play: keep-alive
    KeepAlive(KeepAlive),
    /// Anything else
    Opaque(OpaquePacket),
}

impl Packet {
    /// Protocol state this packet belongs to.
    pub fn state(&self) -> ProtocolState {
        match self {
            Self::Handshake(_) => ProtocolState::Handshaking,
            Self::StatusRequest | Self::StatusResponse(_) | Self::Ping(_) | Self::Pong(_) => {
                ProtocolState::Status
            },
            Self::LoginStart(_) | Self::LoginSuccess(_) | Self::SetCompression(_) => {
                ProtocolState::Login
            },
            Self::KeepAlive(_) => ProtocolState::Play,
            Self::Opaque(packet) => packet.state,
        }
    }

    /// Packet id within its state and direction.
    pub fn id(&self) -> u8 {
        match self {
            Self::Handshake(_) => ids::handshaking::HANDSHAKE,
            Self::StatusRequest => ids::status::REQUEST,
            Self::StatusResponse(_) => ids::status::RESPONSE,
            Self::Ping(_) => ids::status::PING,
            Self::Pong(_) => ids::status::PONG,
            Self::LoginStart(_) => ids::login::START,
            Self::LoginSuccess(_) => ids::login::SUCCESS,
            Self::SetCompression(_) => ids::login::SET_COMPRESSION,
            Self::KeepAlive(_) => ids::play::KEEP_ALIVE,
            Self::Opaque(packet) => packet.id,
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "Handshake",
            Self::StatusRequest => "StatusRequest",
            Self::StatusResponse(_) => "StatusResponse",
            Self::Ping(_) => "Ping",
            Self::Pong(_) => "Pong",
            Self::LoginStart(_) => "LoginStart",
            Self::LoginSuccess(_) => "LoginSuccess",
            Self::SetCompression(_) => "SetCompression",
            Self::KeepAlive(_) => "KeepAlive",
            Self::Opaque(_) => "Opaque",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips_intent() {
        let handshake = Handshake::new(47, "localhost", 25565, NextState::Login);
        assert_eq!(handshake.next_state, 2);
        assert_eq!(handshake.intent(), Ok(NextState::Login));
    }

    #[test]
    fn handshake_with_bogus_intent_fails() {
        let handshake = Handshake {
            protocol_version: 47,
            server_host: "localhost".to_string(),
            server_port: 25565,
            next_state: 7,
        };
        assert!(handshake.intent().is_err());
    }

    #[test]
    fn routing_keys_match_wire_ids() {
        assert_eq!(
            (Packet::StatusRequest.state(), Packet::StatusRequest.id()),
            (ProtocolState::Status, 0x00)
        );
        let ping = Packet::Ping(Ping { time: 1 });
        assert_eq!((ping.state(), ping.id()), (ProtocolState::Status, 0x01));

        let success =
            Packet::LoginSuccess(LoginSuccess { uuid: "0".into(), username: "Steve".into() });
        assert_eq!((success.state(), success.id()), (ProtocolState::Login, 0x02));

        let compression = Packet::SetCompression(SetCompression { threshold: 256 });
        assert_eq!((compression.state(), compression.id()), (ProtocolState::Login, 0x03));

        let keep_alive = Packet::KeepAlive(KeepAlive { keep_alive_id: 9 });
        assert_eq!((keep_alive.state(), keep_alive.id()), (ProtocolState::Play, 0x00));
    }

    #[test]
    fn opaque_packets_keep_their_routing_key() {
        let packet = Packet::Opaque(OpaquePacket {
            state: ProtocolState::Play,
            id: 0x02,
            body: Bytes::from_static(b"{}"),
        });
        assert_eq!(packet.state(), ProtocolState::Play);
        assert_eq!(packet.id(), 0x02);
        assert_eq!(packet.name(), "Opaque");
    }
}
