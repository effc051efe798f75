//! Dht session: owns the node identity, the engine and the search table.

mod config;
mod transmit;

use std::fmt::{self, Debug, Formatter};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::common::{Address, Id, PeerRecord, Protocol};
use crate::engine::{Engine, EngineEvent, EngineHost, EventKind};
use crate::registry::{self, Descriptor, EngineLease, SessionToken};
use crate::search::{SearchResult, SearchTable};
use crate::store::PeerStore;
use crate::{hash, Error, Result};

pub use config::{Config, DEFAULT_BOOTSTRAP_NODES, DEFAULT_VERSION, MAX_FRAME_SLEEP};
pub use transmit::Transmitter;

/// Lifecycle of a [DhtSession].
///
/// [DhtSession::new] walks through `Uninitialized` and `Bootstrapping` before
/// returning, and dropping walks through `ShuttingDown` to `Closed`, so a
/// caller holding a session only ever observes `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Bootstrapping,
    Running,
    ShuttingDown,
    Closed,
}

/// The session half of the engine contract: routes sends to the host
/// transmitter and search results to the search table.
struct SessionHost {
    token: SessionToken,
    transmitter: Box<dyn Transmitter>,
    searches: SearchTable,
}

impl EngineHost for SessionHost {
    fn random_bytes(&mut self, buf: &mut [u8]) -> usize {
        hash::random_bytes(buf)
    }

    fn hash(&self, out: &mut [u8], v1: &[u8], v2: &[u8], v3: &[u8]) {
        hash::dht_hash(out, v1, v2, v3)
    }

    fn is_blacklisted(&self, _address: &Address) -> bool {
        false
    }

    fn send(&mut self, descriptor: Descriptor, data: &[u8], target: &[u8]) -> io::Result<usize> {
        let protocol = match registry::resolve(descriptor) {
            Some((protocol, owner)) if owner == self.token => protocol,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    Error::UnknownDescriptor(descriptor),
                ))
            }
        };

        let target = Address::from_native(target)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

        trace!(context = "session_send", %protocol, %target, len = data.len());
        self.transmitter.transmit(protocol, &target, data);

        Ok(data.len())
    }

    fn on_event(&mut self, event: EngineEvent) {
        let protocol = match event.kind {
            EventKind::Values => Protocol::V4,
            EventKind::Values6 => Protocol::V6,
            kind => {
                debug!(?kind, key = %event.key, "Ignoring engine event");
                return;
            }
        };

        let result = SearchResult::decode(protocol, event.key, &event.payload);
        trace!(key = %result.key, found = result.addresses.len(), "Search values");

        self.searches.deliver(&result);
    }
}

/// A running DHT node.
///
/// Only one session may exist per process. The host drives it by calling
/// [Self::run_frame], waiting on its sockets for at most the returned
/// duration, and feeding every received datagram to [Self::on_data].
/// Dropping the session persists the routing table snapshot.
pub struct DhtSession<E: Engine> {
    engine: E,
    host: SessionHost,
    id: Id,
    state: SessionState,
    descriptors: Vec<(Protocol, Descriptor)>,
    /// Persisted peers of families not registered with the engine, written
    /// back untouched by [Self::snapshot].
    dormant: Vec<PeerRecord>,
    store_path: Option<PathBuf>,
    save_interval: Option<Duration>,
    last_save: Instant,
    // Released last, after the engine is shut down.
    lease: EngineLease,
}

impl<E: Engine> DhtSession<E> {
    /// Take over the engine, restore or create the node identity, and
    /// bootstrap the routing table.
    ///
    /// Fails with [Error::AlreadyActive] while another session exists.
    pub fn new<T>(mut engine: E, config: Config, transmitter: T) -> Result<Self>
    where
        T: Transmitter + 'static,
    {
        if !config.ipv4 && !config.ipv6 {
            return Err(Error::NoTransport);
        }

        let lease = EngineLease::acquire()?;

        let store = match &config.store_path {
            Some(path) => PeerStore::load_or_create(path),
            None => PeerStore::fresh(),
        };

        let token = lease.token();
        let mut descriptors = Vec::with_capacity(2);
        if config.ipv4 {
            descriptors.push((Protocol::V4, registry::register(Protocol::V4, token)));
        }
        if config.ipv6 {
            descriptors.push((Protocol::V6, registry::register(Protocol::V6, token)));
        }

        let descriptor = |protocol| {
            descriptors
                .iter()
                .find(|(p, _)| *p == protocol)
                .map(|(_, d)| *d)
        };

        if let Err(error) = engine.init(
            descriptor(Protocol::V4),
            descriptor(Protocol::V6),
            &store.id,
            config.version,
        ) {
            registry::unregister_all(token);
            return Err(error);
        }

        let mut session = Self {
            engine,
            host: SessionHost {
                token,
                transmitter: Box::new(transmitter),
                searches: SearchTable::new(),
            },
            id: store.id,
            state: SessionState::Bootstrapping,
            descriptors,
            dormant: vec![],
            store_path: config.store_path,
            save_interval: config.save_interval,
            last_save: Instant::now(),
            lease,
        };

        session.bootstrap(&config.bootstrap, &store.peers);
        session.state = SessionState::Running;

        info!(id = %session.id, "DHT session running");

        Ok(session)
    }

    // === Getters ===

    /// This node's id.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Families registered with the engine.
    pub fn protocols(&self) -> Vec<Protocol> {
        self.descriptors.iter().map(|(p, _)| *p).collect()
    }

    /// Number of nodes the engine knows for `protocol`, across all node states.
    pub fn routing_table_size(&self, protocol: Protocol) -> usize {
        if !self.supports(protocol) {
            return 0;
        }

        self.engine.snapshot_counts(protocol).total()
    }

    /// Returns a reference to the underlying engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    // === Public Methods ===

    /// Run the engine's periodic work and re-issue due searches.
    ///
    /// Returns how long the host may wait for datagrams before calling again,
    /// never more than [MAX_FRAME_SLEEP].
    pub fn run_frame(&mut self) -> Duration {
        let now = Instant::now();
        let protocols = self.protocols();

        for (key, port) in self.host.searches.due(now) {
            for protocol in &protocols {
                debug!(%key, port, %protocol, "Searching");
                self.engine
                    .start_search(&mut self.host, &key, port, *protocol);
            }
        }

        let wake = self.engine.feed(&mut self.host, None);

        if let Some(interval) = self.save_interval {
            if now.saturating_duration_since(self.last_save) >= interval {
                self.last_save = now;
                if let Err(error) = self.save() {
                    warn!(?error, "Failed to persist peer store");
                }
            }
        }

        wake.min(MAX_FRAME_SLEEP)
    }

    /// Feed one datagram received on the `protocol` transport to the engine.
    pub fn on_data(&mut self, protocol: Protocol, source: &Address, data: &[u8]) {
        if !self.supports(protocol) || source.protocol() != Some(protocol) {
            trace!(%protocol, %source, "Dropping datagram for unregistered transport");
            return;
        }

        self.engine.feed(&mut self.host, Some((data, source)));
    }

    /// Search for peers of `key`, announcing `port` when non zero.
    ///
    /// The search is issued on the next [Self::run_frame] and repeated every
    /// [crate::search::REQUERY_INTERVAL]. Found addresses are handed to `handler`.
    pub fn search<F>(&mut self, key: Id, port: u16, handler: F)
    where
        F: FnMut(&[Address]) + 'static,
    {
        self.host.searches.register(key, port, handler);
    }

    /// Same as [Self::search] for the hash of `keyword`, returning the key.
    pub fn search_keyword<F>(&mut self, keyword: &str, port: u16, handler: F) -> Id
    where
        F: FnMut(&[Address]) + 'static,
    {
        self.host.searches.register_keyword(keyword, port, handler)
    }

    /// Ask the engine to ping `address`.
    pub fn ping(&mut self, address: &Address) {
        match address.protocol() {
            Some(protocol) if self.supports(protocol) => {
                self.engine.ping(&mut self.host, address);
            }
            _ => trace!(%address, "Not pinging address of unregistered family"),
        }
    }

    /// This node's id and a snapshot of the engine's routing table.
    pub fn snapshot(&self) -> PeerStore {
        let mut store = PeerStore::new(self.id);
        store.peers.extend(self.dormant.iter().cloned());

        for (protocol, _) in &self.descriptors {
            let count = self.engine.snapshot_counts(*protocol).total();
            store
                .peers
                .extend(self.engine.fetch_snapshot(*protocol, count));
        }

        store
    }

    /// Persist [Self::snapshot] to the configured store path, if any.
    pub fn save(&self) -> Result<()> {
        match &self.store_path {
            Some(path) => self.snapshot().save(path),
            None => Ok(()),
        }
    }

    /// Shut the session down now, same as dropping it.
    pub fn close(mut self) {
        self.shutdown();
    }

    // === Private Methods ===

    fn supports(&self, protocol: Protocol) -> bool {
        self.descriptors.iter().any(|(p, _)| *p == protocol)
    }

    fn bootstrap(&mut self, routers: &[String], peers: &[PeerRecord]) {
        let protocols = self.protocols();
        let supported = |address: &Address| {
            address
                .protocol()
                .map_or(false, |protocol| protocols.contains(&protocol))
        };

        for router in routers {
            match Address::resolve_all(router) {
                Ok(addresses) => {
                    for address in addresses.iter().filter(|address| supported(*address)) {
                        trace!(%router, %address, "Pinging bootstrap node");
                        self.engine.ping(&mut self.host, address);
                    }
                }
                Err(error) => {
                    debug!(?error, %router, "Failed to resolve bootstrap node");
                }
            }
        }

        let mut inserted = 0;
        for peer in peers {
            if supported(&peer.address) {
                self.engine
                    .insert_node(&mut self.host, &peer.id, &peer.address);
                inserted += 1;
            } else {
                self.dormant.push(peer.clone());
            }
        }

        debug!(inserted, dormant = self.dormant.len(), "Restored persisted peers");
    }

    fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::ShuttingDown;

        if let Err(error) = self.save() {
            warn!(?error, "Failed to persist peer store");
        }

        self.engine.shutdown();
        registry::unregister_all(self.lease.token());

        self.state = SessionState::Closed;
        info!(id = %self.id, "DHT session closed");
    }
}

impl<E: Engine> Drop for DhtSession<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<E: Engine> Debug for DhtSession<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhtSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("descriptors", &self.descriptors)
            .field("searches", &self.host.searches.len())
            .finish_non_exhaustive()
    }
}
