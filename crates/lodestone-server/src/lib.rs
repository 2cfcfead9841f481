//! Lodestone server.
//!
//! Accepts connections from a [`Listener`], answers status queries, logs
//! players in and kicks those whose keep-alives go stale.
//!
//! # Architecture
//!
//! [`ServerDriver`] is the Sans-IO aggregate: it owns one [`ServerSession`]
//! per connection plus the player count, and turns [`ServerEvent`]s into
//! [`ServerAction`]s. [`Server`] is the tokio runtime around it. Each accepted
//! connection gets its own task that owns the [`PacketStream`] and the
//! connection's [`SessionTimers`]; the driver behind a single mutex is the
//! only state tasks share.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`ServerSession`]: Per-connection lifecycle state machine
//! - [`Server`]: Production runtime that executes ServerDriver actions
//! - [`SessionTimers`]: Login kick and keep-alive timers for one connection
//! - [`SystemEnv`]: Production environment (tokio time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod driver;
mod error;
mod session;
mod system_env;
mod timers;

use std::sync::Arc;

pub use config::{
    DEFAULT_BIND_HOST, DEFAULT_CHECK_INTERVAL, DEFAULT_KICK_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MAX_PLAYERS, DEFAULT_MOTD, ServerConfig, SessionConfig,
};
pub use driver::{
    LogLevel, LoginEvent, PlayerCount, SERVER_FULL_REASON, ServerAction, ServerDriver, ServerEvent,
};
pub use error::ServerError;
use lodestone_core::{Environment, Listener, PacketStream, TransportError};
use lodestone_proto::Packet;
pub use session::{
    KEEP_ALIVE_TIMEOUT_REASON, LOGIN_TIMEOUT_REASON, OFFLINE_UUID, STATUS_COMPLETE_REASON,
    ServerSession, SessionAction,
};
pub use system_env::SystemEnv;
pub use timers::{SessionTimers, TimerKind};
use tokio::{
    sync::{Mutex, broadcast, watch},
    task::JoinSet,
};

/// Buffered events per subscriber before the slowest one starts lagging.
const SUBSCRIBER_CAPACITY: usize = 64;

/// Close reason sent to open connections when the server stops.
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// A play packet from a logged-in player, for application consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    /// Connection the packet arrived on
    pub session_id: u64,
    /// The packet
    pub packet: Packet,
}

/// State shared by the accept loop, connection tasks and handles.
struct Shared<E: Environment> {
    driver: Mutex<ServerDriver<E>>,
    logins: broadcast::Sender<LoginEvent>,
    packets: broadcast::Sender<InboundPacket>,
    shutdown: watch::Sender<bool>,
}

impl<E: Environment> Shared<E> {
    async fn process(&self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        self.driver.lock().await.process_event(event)
    }
}

/// Production Lodestone server.
///
/// Wraps [`ServerDriver`] with a listener and a tokio task per connection.
pub struct Server<L: Listener, E: Environment = SystemEnv> {
    listener: L,
    shared: Arc<Shared<E>>,
    next_session_id: u64,
}

impl<L: Listener> Server<L> {
    /// Create a server on `listener` with the system environment.
    pub fn new(config: ServerConfig, listener: L) -> Result<Self, ServerError> {
        Self::with_env(config, listener, SystemEnv::new())
    }
}

impl<L: Listener, E: Environment> Server<L, E> {
    /// Create a server on `listener` with a custom environment.
    pub fn with_env(config: ServerConfig, listener: L, env: E) -> Result<Self, ServerError> {
        config.validate()?;

        let (logins, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let (packets, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            driver: Mutex::new(ServerDriver::new(env, config)),
            logins,
            packets,
            shutdown,
        });

        Ok(Self { listener, shared, next_session_id: 1 })
    }

    /// Handle for querying and stopping the server after [`Server::run`]
    /// takes ownership.
    pub fn handle(&self) -> ServerHandle<E> {
        ServerHandle { shared: Arc::clone(&self.shared) }
    }

    /// Logged-in players.
    pub async fn player_count(&self) -> u32 {
        self.shared.driver.lock().await.player_count()
    }

    /// Receive a [`LoginEvent`] for every player that logs in from now on.
    pub fn subscribe_logins(&self) -> broadcast::Receiver<LoginEvent> {
        self.shared.logins.subscribe()
    }

    /// Receive play packets forwarded from logged-in players.
    pub fn subscribe_packets(&self) -> broadcast::Receiver<InboundPacket> {
        self.shared.packets.subscribe()
    }

    /// Address the listener is bound to, when it has one.
    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener closes or
    /// [`ServerHandle::shutdown`] is called, then wait for open connections
    /// to finish.
    pub async fn run(mut self) -> Result<(), ServerError> {
        {
            let driver = self.shared.driver.lock().await;
            let config = driver.config();
            let address = self.listener.local_addr().unwrap_or_else(|| config.bind_address());
            tracing::info!(
                %address,
                online_mode = config.online_mode,
                max_players = config.max_players,
                "Server starting"
            );
        }

        let mut shutdown = self.shared.shutdown.subscribe();
        let mut tasks = JoinSet::new();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        let session_id = self.next_session_id;
                        self.next_session_id += 1;

                        let shared = Arc::clone(&self.shared);
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection(session_id, stream, shared).await {
                                tracing::error!(session_id, error = %e, "Connection error");
                            }
                        });
                    },
                    Err(TransportError::Closed) => {
                        tracing::info!("Listener closed");
                        break;
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "Accept error");
                    },
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Connection task failed");
                    }
                },
                _ = shutdown.changed() => {},
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task failed");
            }
        }

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Cloneable handle to a running [`Server`].
pub struct ServerHandle<E: Environment = SystemEnv> {
    shared: Arc<Shared<E>>,
}

impl<E: Environment> Clone for ServerHandle<E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<E: Environment> std::fmt::Debug for ServerHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("subscribers", &self.shared.logins.receiver_count())
            .finish_non_exhaustive()
    }
}

impl<E: Environment> ServerHandle<E> {
    /// Logged-in players.
    pub async fn player_count(&self) -> u32 {
        self.shared.driver.lock().await.player_count()
    }

    /// Open connections, logged in or not.
    pub async fn session_count(&self) -> usize {
        self.shared.driver.lock().await.session_count()
    }

    /// Receive a [`LoginEvent`] for every player that logs in from now on.
    pub fn subscribe_logins(&self) -> broadcast::Receiver<LoginEvent> {
        self.shared.logins.subscribe()
    }

    /// Receive play packets forwarded from logged-in players.
    pub fn subscribe_packets(&self) -> broadcast::Receiver<InboundPacket> {
        self.shared.packets.subscribe()
    }

    /// Stop accepting and close every open connection with
    /// [`SHUTDOWN_REASON`].
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }
}

/// Why a connection task stopped.
enum Exit {
    /// The driver asked for the close
    Requested(String),
    /// The peer closed the stream
    PeerClosed,
    /// Reading or writing failed
    Transport(TransportError),
    /// The server is stopping
    Shutdown,
}

impl Exit {
    fn reason(&self) -> String {
        match self {
            Self::Requested(reason) => reason.clone(),
            Self::PeerClosed => "peer closed".to_string(),
            Self::Transport(e) => e.to_string(),
            Self::Shutdown => SHUTDOWN_REASON.to_string(),
        }
    }
}

/// Run one connection from accept to close.
async fn handle_connection<S: PacketStream, E: Environment>(
    session_id: u64,
    mut stream: S,
    shared: Arc<Shared<E>>,
) -> Result<(), ServerError> {
    let mut timers = SessionTimers::new();
    let mut shutdown = shared.shutdown.subscribe();

    let actions = shared.process(ServerEvent::ConnectionAccepted { session_id }).await?;
    let mut exit =
        execute_actions(session_id, actions, &mut stream, &mut timers, &shared).await.err();

    while exit.is_none() {
        if *shutdown.borrow_and_update() {
            exit = Some(Exit::Shutdown);
            break;
        }

        let event = tokio::select! {
            received = stream.recv() => match received {
                Ok(Some(packet)) => ServerEvent::PacketReceived { session_id, packet },
                Ok(None) => {
                    exit = Some(Exit::PeerClosed);
                    break;
                },
                Err(e) => {
                    exit = Some(Exit::Transport(e));
                    break;
                },
            },
            timer = timers.next() => ServerEvent::TimerFired { session_id, timer },
            _ = shutdown.changed() => continue,
        };

        match shared.process(event).await {
            Ok(actions) => {
                exit = execute_actions(session_id, actions, &mut stream, &mut timers, &shared)
                    .await
                    .err();
            },
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Packet processing error");
                exit = Some(Exit::Requested(e.to_string()));
            },
        }
    }

    timers.cancel_all();

    let exit = exit.unwrap_or(Exit::PeerClosed);
    let reason = exit.reason();
    let actions = shared
        .process(ServerEvent::ConnectionClosed { session_id, reason: Some(reason.clone()) })
        .await?;
    // Only logs and bookkeeping remain; the stream is already done for
    if let Err(Exit::Transport(e)) =
        execute_actions(session_id, actions, &mut stream, &mut timers, &shared).await
    {
        tracing::debug!(session_id, error = %e, "Write after close failed");
    }

    match exit {
        Exit::Requested(_) | Exit::Shutdown => {
            if let Err(e) = stream.close(Some(&reason)).await {
                tracing::debug!(session_id, error = %e, "Close failed");
            }
        },
        Exit::PeerClosed | Exit::Transport(_) => {},
    }

    Ok(())
}

/// Execute server actions for one connection.
///
/// Stops at the first action that ends the connection and reports why.
async fn execute_actions<S: PacketStream, E: Environment>(
    session_id: u64,
    actions: Vec<ServerAction>,
    stream: &mut S,
    timers: &mut SessionTimers,
    shared: &Shared<E>,
) -> Result<(), Exit> {
    for action in actions {
        match action {
            ServerAction::SendToSession { packet, .. } => {
                stream.send(&packet).await.map_err(Exit::Transport)?;
            },
            ServerAction::SetState { state, .. } => stream.set_state(state),
            ServerAction::CloseConnection { reason, .. } => {
                tracing::info!(session_id, %reason, "Closing connection");
                return Err(Exit::Requested(reason));
            },
            ServerAction::ArmLoginKick { timeout, .. } => timers.arm_login_kick(timeout),
            ServerAction::StartKeepAlive { interval, .. } => timers.start_keep_alive(interval),
            ServerAction::CancelTimers { .. } => timers.cancel_all(),
            ServerAction::PlayerJoined(event) => {
                // No subscribers is not an error
                let _ = shared.logins.send(event);
            },
            ServerAction::Forward { session_id, packet } => {
                let _ = shared.packets.send(InboundPacket { session_id, packet });
            },
            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!(session_id, "{}", message),
                LogLevel::Info => tracing::info!(session_id, "{}", message),
                LogLevel::Warn => tracing::warn!(session_id, "{}", message),
                LogLevel::Error => tracing::error!(session_id, "{}", message),
            },
        }
    }

    Ok(())
}
