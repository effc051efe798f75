//! Session and transport layer of a mainline DHT node.
//!
//! A [DhtSession] wraps an opaque [Engine] that implements routing and
//! lookups. The session owns the node id and its persisted [PeerStore],
//! multiplexes IPv4 and IPv6 transports into the engine's descriptor based
//! callbacks, and re-issues keyword and info-hash searches until the host
//! stops driving it.

mod common;
mod error;

pub mod engine;
pub mod hash;
pub mod host;
pub mod registry;
pub mod search;
pub mod session;
pub mod socket;
pub mod store;

pub use crate::common::{compact, Address, Id, PeerRecord, Protocol, ID_SIZE};
pub use engine::{Engine, EngineEvent, EngineHost, EventKind, NodeCounts};
pub use error::Error;
pub use host::{HostLoop, SocketTransmitter};
pub use search::{SearchResult, SearchTable};
pub use session::{Config, DhtSession, SessionState, Transmitter};
pub use socket::Socket;
pub use store::PeerStore;

/// Alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
