//! Client
//!
//! Action-based client session controller for the Lodestone protocol, the
//! server list status query, and the authentication gateway.
//!
//! # Architecture
//!
//! The client follows the same sans-IO, action-based pattern as
//! [`lodestone_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute. [`connect`] and [`ping`] are the tokio drivers.
//!
//! # Components
//!
//! - [`Client`]: session controller for one outbound connection
//! - [`StatusQuery`]: status request plus ping/pong latency probe
//! - [`AuthGateway`]: credential exchange contract, with [`Yggdrasil`] as the
//!   HTTP implementation
//! - [`ConnectedClient`]: running connection returned by [`connect`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth;
mod client;
mod error;
mod event;
mod options;
mod ping;
mod runtime;
mod yggdrasil;

pub use auth::{AuthError, AuthGateway, Profile, Session, generate_client_token};
pub use client::{Client, ClientPhase};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent, KEEP_ALIVE_RESPONSE};
pub use options::{ClientOptions, Credentials, DEFAULT_HOST};
pub use ping::{
    DEFAULT_PING_TIMEOUT, QueryAction, StatusQuery, StatusReply, ping, ping_with_timeout,
};
pub use runtime::{ClientHandle, ClientNotice, ConnectedClient, connect};
pub use yggdrasil::{
    DEFAULT_AUTH_SERVER, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SESSION_SERVER, Yggdrasil,
    YggdrasilConfig,
};
