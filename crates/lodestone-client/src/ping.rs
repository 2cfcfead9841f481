//! Server list status query.
//!
//! Handshake with next state status, request the status document, then
//! measure one ping/pong round trip. [`StatusQuery`] is the sans-IO machine;
//! [`ping`] drives it over a [`Connector`] with a deadline.

use std::{
    ops::Sub,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use lodestone_core::{Connection, ConnectionError, Connector, DispatchTable, PacketStream};
use lodestone_proto::{
    Handshake, NextState, PROTOCOL_VERSION, Packet, Ping, ProtocolState, ServerStatus, ids,
};
use tokio::time::Instant;

use crate::error::ClientError;

/// Deadline for a whole status query.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReply {
    /// Status document reported by the server
    pub status: ServerStatus,
    /// Ping/pong round-trip time
    pub latency: Duration,
}

/// Actions produced by [`StatusQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryAction {
    /// Encode and send a packet
    Send(Packet),
    /// Switch the codec's protocol state
    SetState(ProtocolState),
    /// Query complete; close the connection
    Finished(StatusReply),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryHandler {
    Response,
    Pong,
}

/// Sans-IO status query for one connection.
#[derive(Debug)]
pub struct StatusQuery<I> {
    host: String,
    port: u16,
    ping_time: i64,
    connection: Connection,
    handlers: DispatchTable<QueryHandler>,
    status: Option<ServerStatus>,
    ping_sent_at: Option<I>,
}

impl<I> StatusQuery<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Query `host:port`; `ping_time` is the token echoed by the pong.
    pub fn new(host: impl Into<String>, port: u16, ping_time: i64) -> Self {
        let mut handlers = DispatchTable::new();
        handlers.once(ProtocolState::Status, ids::status::RESPONSE, QueryHandler::Response);

        Self {
            host: host.into(),
            port,
            ping_time,
            connection: Connection::new(),
            handlers,
            status: None,
            ping_sent_at: None,
        }
    }

    /// Status document, once received.
    pub fn status(&self) -> Option<&ServerStatus> {
        self.status.as_ref()
    }

    /// Transport connected: handshake into status and request the document.
    pub fn on_connected(&mut self) -> Result<Vec<QueryAction>, ClientError> {
        self.connection.transition(ProtocolState::Status)?;

        let handshake =
            Handshake::new(PROTOCOL_VERSION, self.host.clone(), self.port, NextState::Status);
        Ok(vec![
            QueryAction::Send(Packet::Handshake(handshake)),
            QueryAction::SetState(ProtocolState::Status),
            QueryAction::Send(Packet::StatusRequest),
        ])
    }

    /// Process a packet from the server.
    ///
    /// # Errors
    ///
    /// `UnexpectedPacket` for anything but the awaited response or pong, and
    /// a protocol error for an unparsable status document.
    pub fn handle_packet(
        &mut self,
        packet: Packet,
        now: I,
    ) -> Result<Vec<QueryAction>, ClientError> {
        let state = self.connection.state();
        let Some(handler) = self.handlers.take(state, packet.id()).into_iter().next() else {
            return Err(unexpected(state, &packet));
        };

        match (handler, packet) {
            (QueryHandler::Response, Packet::StatusResponse(response)) => {
                self.status = Some(ServerStatus::from_json(&response.response)?);
                self.ping_sent_at = Some(now);
                self.handlers.once(ProtocolState::Status, ids::status::PONG, QueryHandler::Pong);
                Ok(vec![QueryAction::Send(Packet::Ping(Ping { time: self.ping_time }))])
            },
            (QueryHandler::Pong, Packet::Pong(pong)) if pong.time != self.ping_time => {
                tracing::debug!(expected = self.ping_time, got = pong.time, "ignoring stale pong");
                self.handlers.once(ProtocolState::Status, ids::status::PONG, QueryHandler::Pong);
                Ok(Vec::new())
            },
            (QueryHandler::Pong, Packet::Pong(_)) => {
                let (Some(status), Some(sent_at)) = (self.status.take(), self.ping_sent_at) else {
                    return Err(ClientError::Connection(ConnectionError::UnexpectedPacket {
                        state,
                        packet: "Pong",
                        id: ids::status::PONG,
                    }));
                };
                Ok(vec![QueryAction::Finished(StatusReply { status, latency: now - sent_at })])
            },
            (_, packet) => Err(unexpected(state, &packet)),
        }
    }
}

fn unexpected(state: ProtocolState, packet: &Packet) -> ClientError {
    ClientError::Connection(ConnectionError::UnexpectedPacket {
        state,
        packet: packet.name(),
        id: packet.id(),
    })
}

/// Query the status of `host:port` with [`DEFAULT_PING_TIMEOUT`].
pub async fn ping<C: Connector>(
    host: &str,
    port: u16,
    connector: &C,
) -> Result<StatusReply, ClientError> {
    ping_with_timeout(host, port, connector, DEFAULT_PING_TIMEOUT).await
}

/// Query the status of `host:port`, giving up after `timeout`.
pub async fn ping_with_timeout<C: Connector>(
    host: &str,
    port: u16,
    connector: &C,
    timeout: Duration,
) -> Result<StatusReply, ClientError> {
    tokio::time::timeout(timeout, run_query(host, port, connector))
        .await
        .map_err(|_| ClientError::Timeout(timeout))?
}

async fn run_query<C: Connector>(
    host: &str,
    port: u16,
    connector: &C,
) -> Result<StatusReply, ClientError> {
    let mut stream = connector.connect(host, port).await?;
    let mut query = StatusQuery::new(host, port, wall_clock_millis());

    for action in query.on_connected()? {
        if let Some(reply) = execute(&mut stream, action).await? {
            return Ok(reply);
        }
    }

    loop {
        let Some(packet) = stream.recv().await? else {
            return Err(ClientError::Transport(lodestone_core::TransportError::Closed));
        };

        for action in query.handle_packet(packet, Instant::now())? {
            if let Some(reply) = execute(&mut stream, action).await? {
                if let Err(e) = stream.close(None).await {
                    tracing::debug!(error = %e, "close after status query failed");
                }
                tracing::debug!(host, port, latency = ?reply.latency, "status query complete");
                return Ok(reply);
            }
        }
    }
}

async fn execute<S: PacketStream>(
    stream: &mut S,
    action: QueryAction,
) -> Result<Option<StatusReply>, ClientError> {
    match action {
        QueryAction::Send(packet) => stream.send(&packet).await?,
        QueryAction::SetState(state) => stream.set_state(state),
        QueryAction::Finished(reply) => return Ok(Some(reply)),
    }
    Ok(None)
}

fn wall_clock_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use lodestone_proto::{LoginStart, Pong, StatusResponse};

    use super::*;

    fn response() -> Packet {
        let status = ServerStatus::new("A Minecraft server", 1, 20, None);
        Packet::StatusResponse(StatusResponse { response: status.to_json().unwrap() })
    }

    #[test]
    fn connect_requests_status() {
        let mut query = StatusQuery::<Instant>::new("localhost", 25565, 1234);
        let actions = query.on_connected().unwrap();

        assert_eq!(actions, vec![
            QueryAction::Send(Packet::Handshake(Handshake::new(
                PROTOCOL_VERSION,
                "localhost",
                25565,
                NextState::Status
            ))),
            QueryAction::SetState(ProtocolState::Status),
            QueryAction::Send(Packet::StatusRequest),
        ]);
    }

    #[test]
    fn response_then_pong_finishes_with_latency() {
        let t0 = Instant::now();
        let mut query = StatusQuery::new("localhost", 25565, 1234);
        query.on_connected().unwrap();

        let actions = query.handle_packet(response(), t0).unwrap();
        assert_eq!(actions, vec![QueryAction::Send(Packet::Ping(Ping { time: 1234 }))]);
        assert_eq!(query.status().unwrap().players.max, 20);

        let later = t0 + Duration::from_millis(42);
        let actions = query.handle_packet(Packet::Pong(Pong { time: 1234 }), later).unwrap();
        let [QueryAction::Finished(reply)] = actions.as_slice() else {
            panic!("expected a finished query, got {actions:?}");
        };
        assert_eq!(reply.latency, Duration::from_millis(42));
        assert_eq!(reply.status.description.text, "A Minecraft server");
    }

    #[test]
    fn stale_pong_is_ignored() {
        let t0 = Instant::now();
        let mut query = StatusQuery::new("localhost", 25565, 1234);
        query.on_connected().unwrap();
        query.handle_packet(response(), t0).unwrap();

        assert!(query.handle_packet(Packet::Pong(Pong { time: 1 }), t0).unwrap().is_empty());
        let actions = query.handle_packet(Packet::Pong(Pong { time: 1234 }), t0).unwrap();
        assert!(matches!(actions.as_slice(), [QueryAction::Finished(_)]));
    }

    #[test]
    fn pong_before_response_is_unexpected() {
        let mut query = StatusQuery::new("localhost", 25565, 1234);
        query.on_connected().unwrap();

        let err = query.handle_packet(Packet::Pong(Pong { time: 1234 }), Instant::now());
        assert!(matches!(
            err,
            Err(ClientError::Connection(ConnectionError::UnexpectedPacket { packet: "Pong", .. }))
        ));
    }

    #[test]
    fn login_packets_are_unexpected() {
        let mut query = StatusQuery::new("localhost", 25565, 0);
        query.on_connected().unwrap();

        let packet = Packet::LoginStart(LoginStart { username: "Steve".into() });
        assert!(query.handle_packet(packet, Instant::now()).is_err());
    }

    #[test]
    fn malformed_document_fails() {
        let mut query = StatusQuery::new("localhost", 25565, 0);
        query.on_connected().unwrap();

        let packet = Packet::StatusResponse(StatusResponse { response: "{".into() });
        assert!(matches!(
            query.handle_packet(packet, Instant::now()),
            Err(ClientError::Connection(ConnectionError::Protocol(_)))
        ));
    }
}
