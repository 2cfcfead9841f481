//! Server running over the in-memory transport.

use lodestone_server::{Server, ServerConfig, ServerError, ServerHandle};
use tokio::task::JoinHandle;

use crate::{
    sim_env::SimEnv,
    sim_transport::{SimConnector, sim_network},
};

/// Host the simulated listener reports.
pub const SIM_HOST: &str = "sim.lodestone";

/// A [`Server`] spawned on the current runtime, reachable through
/// [`SimServer::connector`].
#[derive(Debug)]
pub struct SimServer {
    handle: ServerHandle<SimEnv>,
    connector: SimConnector,
    port: u16,
    task: JoinHandle<Result<(), ServerError>>,
}

impl SimServer {
    /// Spawn a server with `config` and an environment seeded with `seed`.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(config: ServerConfig, seed: u64) -> Result<Self, ServerError> {
        let port = config.port;
        let (listener, connector) = sim_network(format!("{SIM_HOST}:{port}"));
        let server = Server::with_env(config, listener, SimEnv::with_seed(seed))?;
        let handle = server.handle();
        let task = tokio::spawn(server.run());
        tracing::debug!(seed, port, "sim server started");

        Ok(Self { handle, connector, port, task })
    }

    /// Handle to the running server.
    pub fn handle(&self) -> &ServerHandle<SimEnv> {
        &self.handle
    }

    /// Connector whose connections reach this server.
    pub fn connector(&self) -> &SimConnector {
        &self.connector
    }

    /// Host and port clients should be configured with.
    pub fn address(&self) -> (&'static str, u16) {
        (SIM_HOST, self.port)
    }

    /// Shut the server down and wait for it to close every connection.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.handle.shutdown();
        match self.task.await {
            Ok(result) => {
                tracing::debug!(port = self.port, ok = result.is_ok(), "sim server stopped");
                result
            },
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::warn!(port = self.port, error = %e, "sim server task cancelled");
                Ok(())
            },
        }
    }
}
