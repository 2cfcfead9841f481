//! Deterministic simulation harness for Lodestone.
//!
//! In-memory implementations of the environment, transport and
//! authentication seams, so client and server runtimes can be driven end to
//! end without sockets or HTTP.
//!
//! Tests run on tokio's paused clock (`#[tokio::test(start_paused = true)]`):
//! login kicks and keep-alive intervals fire in virtual time, and a seeded
//! [`SimEnv`] makes keep-alive ids reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mock_gateway;
pub mod sim_env;
pub mod sim_peer;
pub mod sim_server;
pub mod sim_transport;

pub use mock_gateway::{GatewayCall, MockGateway};
pub use sim_env::SimEnv;
pub use sim_peer::SimPeer;
pub use sim_server::{SIM_HOST, SimServer};
pub use sim_transport::{
    ConnectAttempt, SimConnector, SimListener, SimStream, SimStreamView, sim_network,
};
