//! Lodestone protocol model.
//!
//! Typed lifecycle packets for a Minecraft-style protocol: the handshake, the
//! status query, login, and the play-state keep-alive. Byte framing and field
//! encoding belong to the codec sitting behind
//! `lodestone_core::transport::PacketStream`; this crate only fixes the
//! vocabulary both sides agree on.
//!
//! # Protocol States
//!
//! ```text
//!                 next_state = 1   ┌────────┐
//!              ┌──────────────────>│ Status │ (terminal after ping/pong)
//! ┌─────────────┐                  └────────┘
//! │ Handshaking │
//! └─────────────┘  next_state = 2  ┌───────┐  LoginSuccess  ┌──────┐
//!              └──────────────────>│ Login │───────────────>│ Play │
//!                                  └───────┘                └──────┘
//! ```
//!
//! Packet ids are only unique within a `(state, direction)` pair, so a
//! receiver routes on `(ProtocolState, id)`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod packet;
pub mod state;
pub mod status;

pub use errors::{ProtocolError, Result};
pub use packet::{
    Handshake, KeepAlive, LoginStart, LoginSuccess, OpaquePacket, Packet, Ping, Pong,
    SetCompression, StatusResponse, ids,
};
pub use state::{NextState, ProtocolState};
pub use status::{ServerStatus, StatusDescription, StatusPlayers, StatusSample, StatusVersion};

/// Protocol version number sent in the handshake and advertised in status.
pub const PROTOCOL_VERSION: i32 = 47;

/// Human-readable game version advertised in status responses.
pub const MINECRAFT_VERSION: &str = "1.8";

/// Default server port.
pub const DEFAULT_PORT: u16 = 25565;
