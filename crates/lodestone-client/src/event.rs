//! Client events and actions.

use lodestone_proto::{Packet, ProtocolState};

use crate::auth::{AuthError, Session};

/// Pre-framed keep-alive answer, sent verbatim without going through the
/// codec.
pub const KEEP_ALIVE_RESPONSE: [u8; 4] = [0x03, 0x00, 0x03, 0x01];

/// Events the caller feeds into the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The gateway produced a session.
    SessionAcquired(Session),

    /// The gateway failed. The client ends without connecting.
    AuthenticationFailed(AuthError),

    /// The transport connected to the server.
    Connected,

    /// Packet received from the server.
    PacketReceived(Packet),

    /// The connection is gone.
    Disconnected {
        /// Why, if known.
        reason: Option<String>,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Exchange credentials with the gateway, then feed back
    /// `SessionAcquired` or `AuthenticationFailed`.
    Authenticate {
        /// Account login
        username: String,
        /// Password or access token
        credential: String,
        /// Client token
        client_token: String,
        /// Whether `credential` is an access token to refresh
        is_token: bool,
    },

    /// Open the one connection to the server, then feed back `Connected`.
    Connect {
        /// Server host
        host: String,
        /// Server port
        port: u16,
    },

    /// Encode and send a packet.
    Send(Packet),

    /// Send pre-framed bytes verbatim.
    SendRaw(Vec<u8>),

    /// Switch the codec's protocol state.
    SetState(ProtocolState),

    /// Compress later traffic at `threshold`.
    EnableCompression {
        /// Compression threshold
        threshold: i32,
    },

    /// Authentication succeeded.
    SessionReady(Session),

    /// Login completed, the connection is in play.
    LoggedIn {
        /// Final username
        username: String,
        /// Player uuid
        uuid: String,
    },

    /// Packet nothing in the lifecycle layer handles. Belongs to the
    /// application.
    Unhandled(Packet),

    /// The client ended.
    Ended {
        /// Why, if known.
        reason: Option<String>,
    },
}
