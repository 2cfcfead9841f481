//! Tokio runtime for the client controller.
//!
//! [`connect`] runs the authentication step to completion, opens exactly one
//! connection and hands it to a background task that pumps packets through
//! the sans-IO [`Client`]. The caller gets a [`ConnectedClient`]: a stream of
//! [`ClientNotice`]s and a [`ClientHandle`] for sending.

use lodestone_core::{Connector, PacketStream};
use lodestone_proto::Packet;
use tokio::sync::mpsc;

use crate::{
    auth::{AuthGateway, Session},
    client::Client,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    options::ClientOptions,
};

/// Capacity of the notice and command channels.
const CHANNEL_CAPACITY: usize = 64;

/// What the client reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    /// Authentication succeeded
    SessionReady(Session),
    /// Login completed
    LoggedIn {
        /// Final username
        username: String,
        /// Player uuid
        uuid: String,
    },
    /// Compression switched on
    CompressionEnabled {
        /// Compression threshold
        threshold: i32,
    },
    /// Packet for the application
    Packet(Packet),
    /// Connection ended; no further notices follow
    Ended {
        /// Why, if known
        reason: Option<String>,
    },
}

#[derive(Debug)]
enum Command {
    Send(Packet),
    Disconnect(Option<String>),
}

/// Cloneable handle for talking to a running client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Queue a packet for the server.
    pub async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        self.commands
            .send(Command::Send(packet))
            .await
            .map_err(|_| ClientError::Transport(lodestone_core::TransportError::Closed))
    }

    /// Close the connection with an optional reason.
    pub async fn disconnect(&self, reason: Option<String>) -> Result<(), ClientError> {
        self.commands
            .send(Command::Disconnect(reason))
            .await
            .map_err(|_| ClientError::Transport(lodestone_core::TransportError::Closed))
    }
}

/// A client whose connection is open and pumped by a background task.
#[derive(Debug)]
pub struct ConnectedClient {
    /// Notices from the connection, ending with [`ClientNotice::Ended`].
    pub notices: mpsc::Receiver<ClientNotice>,
    handle: ClientHandle,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Handle for sending packets.
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Next notice, or `None` once the connection task is gone.
    pub async fn next_notice(&mut self) -> Option<ClientNotice> {
        self.notices.recv().await
    }

    /// Abort the connection task without a close handshake.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// Authenticate if needed, connect, and start pumping packets.
///
/// The gateway is awaited to completion before the connector is touched; an
/// authentication failure returns without opening any connection.
pub async fn connect<G, C>(
    options: ClientOptions,
    gateway: &G,
    connector: &C,
) -> Result<ConnectedClient, ClientError>
where
    G: AuthGateway + ?Sized,
    C: Connector,
{
    let mut client = Client::new(options)?;
    let (notice_tx, notice_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let mut pending = client.start()?;

    // Authentication and connect are the only steps that happen before the
    // pump task exists.
    let mut stream = loop {
        if pending.is_empty() {
            return Err(ClientError::InvalidOptions("client produced no connect".to_string()));
        }
        let action = pending.remove(0);

        match action {
            ClientAction::Authenticate { username, credential, client_token, is_token } => {
                tracing::debug!(%username, is_token, "acquiring session");
                let event = match gateway
                    .acquire_session(&username, &credential, &client_token, is_token)
                    .await
                {
                    Ok(session) => ClientEvent::SessionAcquired(session),
                    Err(e) => {
                        tracing::warn!(%username, error = %e, "authentication failed");
                        ClientEvent::AuthenticationFailed(e)
                    },
                };
                pending.extend(client.handle(event)?);
            },
            ClientAction::SessionReady(session) => {
                let _ = notice_tx.send(ClientNotice::SessionReady(session)).await;
            },
            ClientAction::Connect { host, port } => {
                tracing::debug!(%host, port, "connecting");
                break connector.connect(&host, port).await?;
            },
            other => {
                tracing::warn!(action = ?other, "unexpected action before connect");
            },
        }
    };

    let mut actions = pending;
    actions.extend(client.handle(ClientEvent::Connected)?);
    for action in actions {
        if let Err(e) = execute(&mut stream, &notice_tx, action).await {
            let _ = stream.close(None).await;
            return Err(e);
        }
    }

    let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(run_connection(client, stream, command_rx, notice_tx));

    Ok(ConnectedClient {
        notices: notice_rx,
        handle: ClientHandle { commands: command_tx },
        abort_handle: task.abort_handle(),
    })
}

/// Pump packets until either side ends the connection.
async fn run_connection<S: PacketStream>(
    mut client: Client,
    mut stream: S,
    mut commands: mpsc::Receiver<Command>,
    notices: mpsc::Sender<ClientNotice>,
) {
    let reason = loop {
        let event = tokio::select! {
            incoming = stream.recv() => match incoming {
                Ok(Some(packet)) => ClientEvent::PacketReceived(packet),
                Ok(None) => break None,
                Err(e) => break Some(e.to_string()),
            },
            command = commands.recv() => match command {
                Some(Command::Send(packet)) => {
                    if let Err(e) = stream.send(&packet).await {
                        break Some(e.to_string());
                    }
                    continue;
                },
                Some(Command::Disconnect(reason)) => {
                    if let Err(e) = stream.close(reason.as_deref()).await {
                        tracing::debug!(error = %e, "close failed");
                    }
                    break reason;
                },
                None => {
                    let _ = stream.close(None).await;
                    break None;
                },
            },
        };

        match client.handle(event) {
            Ok(actions) => {
                let mut failure = None;
                for action in actions {
                    if let Err(e) = execute(&mut stream, &notices, action).await {
                        failure = Some(e.to_string());
                        break;
                    }
                }
                if let Some(reason) = failure {
                    let _ = stream.close(Some(&reason)).await;
                    break Some(reason);
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "client protocol error");
                let reason = e.to_string();
                let _ = stream.close(Some(&reason)).await;
                break Some(reason);
            },
        }
    };

    tracing::debug!(username = client.username(), ?reason, "client connection ended");
    if let Ok(actions) = client.handle(ClientEvent::Disconnected { reason }) {
        for action in actions {
            let _ = execute(&mut stream, &notices, action).await;
        }
    }
}

async fn execute<S: PacketStream>(
    stream: &mut S,
    notices: &mpsc::Sender<ClientNotice>,
    action: ClientAction,
) -> Result<(), ClientError> {
    let notice = match action {
        ClientAction::Send(packet) => {
            stream.send(&packet).await?;
            return Ok(());
        },
        ClientAction::SendRaw(bytes) => {
            stream.send_raw(&bytes).await?;
            return Ok(());
        },
        ClientAction::SetState(state) => {
            stream.set_state(state);
            return Ok(());
        },
        ClientAction::EnableCompression { threshold } => {
            stream.set_compression(threshold);
            ClientNotice::CompressionEnabled { threshold }
        },
        ClientAction::SessionReady(session) => ClientNotice::SessionReady(session),
        ClientAction::LoggedIn { username, uuid } => {
            tracing::info!(%username, %uuid, "logged in");
            ClientNotice::LoggedIn { username, uuid }
        },
        ClientAction::Unhandled(packet) => ClientNotice::Packet(packet),
        ClientAction::Ended { reason } => ClientNotice::Ended { reason },
        ClientAction::Authenticate { .. } | ClientAction::Connect { .. } => {
            tracing::warn!("authentication or connect requested on an open connection");
            return Ok(());
        },
    };

    // A dropped receiver only means nobody is listening
    let _ = notices.send(notice).await;
    Ok(())
}
