//! Transport contracts.
//!
//! The lifecycle state machines never touch sockets. A runtime hands them
//! typed [`Packet`]s read from a [`PacketStream`] and writes their output back
//! through it. Framing, varints and body compression live behind the trait,
//! in whatever codec the embedding application plugs in.
//!
//! # Cancel safety
//!
//! [`PacketStream::recv`] MUST be cancel-safe: runtimes race it against
//! timers in `tokio::select!`, and a cancelled `recv` must not drop a packet.

use async_trait::async_trait;
use lodestone_proto::{Packet, ProtocolState};

use crate::error::TransportError;

/// Bidirectional stream of decoded packets for one connection.
#[async_trait]
pub trait PacketStream: Send + 'static {
    /// Next packet from the peer.
    ///
    /// `Ok(None)` means the peer closed the stream cleanly.
    async fn recv(&mut self) -> Result<Option<Packet>, TransportError>;

    /// Encode and send a packet.
    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError>;

    /// Send pre-framed bytes verbatim, bypassing the codec.
    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Switch the codec to `state` for both directions.
    fn set_state(&mut self, state: ProtocolState);

    /// Compress every later packet whose body is at least `threshold` bytes.
    fn set_compression(&mut self, threshold: i32);

    /// Close the stream, optionally telling the peer why.
    async fn close(&mut self, reason: Option<&str>) -> Result<(), TransportError>;
}

/// Source of inbound connections.
#[async_trait]
pub trait Listener: Send + 'static {
    /// Stream type produced for each accepted connection.
    type Stream: PacketStream;

    /// Wait for the next inbound connection.
    async fn accept(&mut self) -> Result<Self::Stream, TransportError>;

    /// Address the listener is bound to, when it has one.
    fn local_addr(&self) -> Option<String> {
        None
    }
}

/// Opens outbound connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stream type produced for each connection.
    type Stream: PacketStream;

    /// Connect to `host:port`.
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Stream, TransportError>;
}
