//! In-memory transport.
//!
//! [`sim_network`] returns a listener and a connector joined by channels.
//! Each connection is a pair of [`SimStream`]s that exchange typed packets,
//! so no byte codec is involved. Pre-framed bytes sent with
//! [`PacketStream::send_raw`] are decoded on the receiving end with the
//! uncompressed or compressed frame layout, restricted to single-byte
//! varints.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use lodestone_core::{Connector, Listener, PacketStream, TransportError};
use lodestone_proto::{KeepAlive, OpaquePacket, Packet, ProtocolState, ids};
use tokio::{sync::mpsc, time::Instant};

/// What travels between the two ends of a connection.
#[derive(Debug, Clone)]
enum Wire {
    Packet(Packet),
    Raw(Vec<u8>),
    Close(Option<String>),
}

#[derive(Debug, Clone, Copy)]
struct CodecSettings {
    state: ProtocolState,
    compression: Option<i32>,
}

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct SimStream {
    tx: mpsc::UnboundedSender<Wire>,
    rx: mpsc::UnboundedReceiver<Wire>,
    codec: Arc<Mutex<CodecSettings>>,
    closed: bool,
    peer_closed: bool,
    peer_close_reason: Option<String>,
}

impl SimStream {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Wire>, rx: mpsc::UnboundedReceiver<Wire>) -> Self {
        Self {
            tx,
            rx,
            codec: Arc::new(Mutex::new(CodecSettings {
                state: ProtocolState::Handshaking,
                compression: None,
            })),
            closed: false,
            peer_closed: false,
            peer_close_reason: None,
        }
    }

    /// Codec state set by the owner of this end.
    pub fn state(&self) -> ProtocolState {
        lock(&self.codec).state
    }

    /// Compression threshold, once enabled.
    pub fn compression(&self) -> Option<i32> {
        lock(&self.codec).compression
    }

    /// View of this end's codec settings that stays valid after the stream
    /// is moved into a task.
    pub fn view(&self) -> SimStreamView {
        SimStreamView { codec: Arc::clone(&self.codec) }
    }

    /// Whether the peer closed or dropped its end.
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Reason the peer gave when it closed, if any.
    pub fn peer_close_reason(&self) -> Option<&str> {
        self.peer_close_reason.as_deref()
    }

    fn transmit(&mut self, wire: Wire) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx.send(wire).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl PacketStream for SimStream {
    async fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        if self.peer_closed {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(Wire::Packet(packet)) => Ok(Some(packet)),
            Some(Wire::Raw(bytes)) => {
                let settings = *lock(&self.codec);
                decode_raw_frame(&bytes, settings.state, settings.compression.is_some()).map(Some)
            },
            Some(Wire::Close(reason)) => {
                self.peer_closed = true;
                self.peer_close_reason = reason;
                Ok(None)
            },
            None => {
                self.peer_closed = true;
                Ok(None)
            },
        }
    }

    async fn send(&mut self, packet: &Packet) -> Result<(), TransportError> {
        self.transmit(Wire::Packet(packet.clone()))
    }

    async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.transmit(Wire::Raw(bytes.to_vec()))
    }

    fn set_state(&mut self, state: ProtocolState) {
        lock(&self.codec).state = state;
    }

    fn set_compression(&mut self, threshold: i32) {
        lock(&self.codec).compression = Some(threshold);
    }

    async fn close(&mut self, reason: Option<&str>) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone
        let _ = self.tx.send(Wire::Close(reason.map(str::to_string)));
        Ok(())
    }
}

/// Codec settings of a [`SimStream`] owned elsewhere.
#[derive(Debug, Clone)]
pub struct SimStreamView {
    codec: Arc<Mutex<CodecSettings>>,
}

impl SimStreamView {
    /// Current codec state of the viewed end.
    pub fn state(&self) -> ProtocolState {
        lock(&self.codec).state
    }

    /// Compression threshold of the viewed end, once enabled.
    pub fn compression(&self) -> Option<i32> {
        lock(&self.codec).compression
    }
}

/// A connection attempt seen by a [`SimConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Requested host
    pub host: String,
    /// Requested port
    pub port: u16,
    /// When the attempt was made
    pub at: Instant,
}

/// Accepts connections opened through the paired [`SimConnector`].
#[derive(Debug)]
pub struct SimListener {
    incoming: mpsc::UnboundedReceiver<SimStream>,
    address: String,
}

#[async_trait]
impl Listener for SimListener {
    type Stream = SimStream;

    /// Next connection. Fails with [`TransportError::Closed`] once every
    /// connector is dropped.
    async fn accept(&mut self) -> Result<SimStream, TransportError> {
        self.incoming.recv().await.ok_or(TransportError::Closed)
    }

    fn local_addr(&self) -> Option<String> {
        Some(self.address.clone())
    }
}

/// Opens connections to the paired [`SimListener`] and records every
/// attempt.
#[derive(Debug, Clone)]
pub struct SimConnector {
    listener: mpsc::UnboundedSender<SimStream>,
    attempts: Arc<Mutex<Vec<ConnectAttempt>>>,
    opened: Arc<Mutex<Vec<SimStreamView>>>,
}

impl SimConnector {
    /// Every connection attempt so far, in order.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        lock(&self.attempts).clone()
    }

    /// Views of the client ends this connector handed out, in order.
    pub fn opened(&self) -> Vec<SimStreamView> {
        lock(&self.opened).clone()
    }
}

#[async_trait]
impl Connector for SimConnector {
    type Stream = SimStream;

    /// Any host and port reach the paired listener.
    async fn connect(&self, host: &str, port: u16) -> Result<SimStream, TransportError> {
        lock(&self.attempts).push(ConnectAttempt {
            host: host.to_string(),
            port,
            at: Instant::now(),
        });

        let (client, server) = SimStream::pair();
        self.listener
            .send(server)
            .map_err(|_| TransportError::Io(format!("connection to {host}:{port} refused")))?;
        lock(&self.opened).push(client.view());
        tracing::trace!(host, port, "sim connection opened");
        Ok(client)
    }
}

/// Listener bound to `address` and a connector that reaches it.
pub fn sim_network(address: impl Into<String>) -> (SimListener, SimConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = SimListener { incoming: rx, address: address.into() };
    let connector = SimConnector {
        listener: tx,
        attempts: Arc::new(Mutex::new(Vec::new())),
        opened: Arc::new(Mutex::new(Vec::new())),
    };
    (listener, connector)
}

/// Decode `[length, (data length,) id, body..]` with single-byte varints.
fn decode_raw_frame(
    bytes: &[u8],
    state: ProtocolState,
    compressed: bool,
) -> Result<Packet, TransportError> {
    let (&length, rest) = bytes.split_first().ok_or_else(|| codec("empty frame"))?;
    if length >= 0x80 || usize::from(length) != rest.len() {
        return Err(codec(format!("frame length {length} does not match {}", rest.len())));
    }

    let rest = if compressed {
        match rest.split_first() {
            Some((0, uncompressed)) => uncompressed,
            Some((data_length, _)) => {
                return Err(codec(format!("compressed body of {data_length} bytes")));
            },
            None => return Err(codec("missing data length")),
        }
    } else {
        rest
    };

    let (&id, body) = rest.split_first().ok_or_else(|| codec("missing packet id"))?;

    if state == ProtocolState::Play && id == ids::play::KEEP_ALIVE {
        return match body.first() {
            Some(&keep_alive_id) if keep_alive_id < 0x80 => {
                Ok(Packet::KeepAlive(KeepAlive { keep_alive_id: i32::from(keep_alive_id) }))
            },
            _ => Err(codec("keep-alive id is not a single-byte varint")),
        };
    }

    Ok(Packet::Opaque(OpaquePacket { state, id, body: Bytes::copy_from_slice(body) }))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn codec(message: impl Into<String>) -> TransportError {
    TransportError::Codec(message.into())
}
