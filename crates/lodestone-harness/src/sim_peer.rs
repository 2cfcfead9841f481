//! Hand-driven client for server tests.
//!
//! [`SimPeer`] speaks packets directly, without the client state machine, so
//! tests can stall mid-login, skip keep-alive answers or send packets out of
//! order.

use lodestone_core::{Connector, PacketStream, TransportError};
use lodestone_proto::{
    Handshake, KeepAlive, LoginStart, LoginSuccess, PROTOCOL_VERSION, Packet, Ping,
    ProtocolState, ServerStatus,
};

use crate::sim_transport::{SimConnector, SimStream};

/// Raw client end of one connection.
#[derive(Debug)]
pub struct SimPeer {
    stream: SimStream,
}

impl SimPeer {
    /// Open a connection through `connector`.
    pub async fn connect(
        connector: &SimConnector,
        host: &str,
        port: u16,
    ) -> Result<Self, TransportError> {
        Ok(Self { stream: connector.connect(host, port).await? })
    }

    /// Send a handshake announcing `next_state` and follow it locally when it
    /// names a valid state.
    pub async fn handshake(&mut self, next_state: i32) -> Result<(), TransportError> {
        tracing::trace!(next_state, "sim peer handshake");
        self.stream
            .send(&Packet::Handshake(Handshake {
                protocol_version: PROTOCOL_VERSION,
                server_host: "localhost".to_string(),
                server_port: lodestone_proto::DEFAULT_PORT,
                next_state,
            }))
            .await?;

        match next_state {
            1 => self.stream.set_state(ProtocolState::Status),
            2 => self.stream.set_state(ProtocolState::Login),
            _ => {},
        }
        Ok(())
    }

    /// Handshake for login, send login start and wait for login success.
    pub async fn login(&mut self, username: &str) -> Result<LoginSuccess, TransportError> {
        tracing::trace!(username, "sim peer login");
        self.handshake(2).await?;
        self.send(Packet::LoginStart(LoginStart { username: username.to_string() })).await?;

        match self.expect_packet().await? {
            Packet::LoginSuccess(success) => {
                self.stream.set_state(ProtocolState::Play);
                Ok(success)
            },
            other => Err(unexpected("LoginSuccess", &other)),
        }
    }

    /// Handshake for status and fetch the status document.
    pub async fn status(&mut self) -> Result<ServerStatus, TransportError> {
        self.handshake(1).await?;
        self.send(Packet::StatusRequest).await?;

        match self.expect_packet().await? {
            Packet::StatusResponse(response) => ServerStatus::from_json(&response.response)
                .map_err(|e| TransportError::Codec(e.to_string())),
            other => Err(unexpected("StatusResponse", &other)),
        }
    }

    /// Send a ping and return the echoed time.
    pub async fn ping(&mut self, time: i64) -> Result<i64, TransportError> {
        self.send(Packet::Ping(Ping { time })).await?;

        match self.expect_packet().await? {
            Packet::Pong(pong) => Ok(pong.time),
            other => Err(unexpected("Pong", &other)),
        }
    }

    /// Answer a keep-alive probe.
    pub async fn answer_keep_alive(&mut self, keep_alive_id: i32) -> Result<(), TransportError> {
        self.send(Packet::KeepAlive(KeepAlive { keep_alive_id })).await
    }

    /// Send any packet.
    pub async fn send(&mut self, packet: Packet) -> Result<(), TransportError> {
        self.stream.send(&packet).await
    }

    /// Next packet, or `None` once the server closed.
    pub async fn next_packet(&mut self) -> Result<Option<Packet>, TransportError> {
        self.stream.recv().await
    }

    /// Next packet; a close is an error.
    pub async fn expect_packet(&mut self) -> Result<Packet, TransportError> {
        self.stream.recv().await?.ok_or(TransportError::Closed)
    }

    /// Wait for the server to close, skipping packets, and return its reason.
    pub async fn closed(&mut self) -> Result<Option<String>, TransportError> {
        while self.stream.recv().await?.is_some() {}
        Ok(self.stream.peer_close_reason().map(str::to_string))
    }

    /// Close from this side.
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stream.close(None).await
    }

    /// Underlying stream.
    pub fn stream(&self) -> &SimStream {
        &self.stream
    }
}

fn unexpected(expected: &str, got: &Packet) -> TransportError {
    TransportError::Codec(format!("expected {expected}, got {}", got.name()))
}
