//! Lodestone core.
//!
//! Pieces shared by the client and server controllers:
//!
//! - [`connection`]: the per-connection lifecycle record (state, identity,
//!   compression)
//! - [`dispatch`]: the `(state, packet id)` handler table
//! - [`digest`]: signed-hex SHA-1 digests for the session service
//! - [`duration_ms`]: serde helper for millisecond durations in config
//! - [`env`]: clock and randomness abstraction
//! - [`transport`]: packet stream, listener and connector contracts
//!
//! Nothing here performs I/O. Runtimes live in `lodestone-client` and
//! `lodestone-server`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod digest;
pub mod dispatch;
pub mod duration_ms;
pub mod env;
pub mod error;
pub mod transport;

pub use connection::{Compression, Connection};
pub use digest::{hex_digest, server_hash};
pub use dispatch::{DispatchTable, RouteKey, Subscription};
pub use env::Environment;
pub use error::{ConnectionError, TransportError};
pub use transport::{Connector, Listener, PacketStream};
