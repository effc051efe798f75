//! Contract between the session and the DHT engine.
//!
//! The engine owns routing, bucket refresh and iterative lookups. It is
//! addressed through [Engine], and calls back into the session through the
//! [EngineHost] it is handed on every operation that may send or report.

use std::io;
use std::time::Duration;

use crate::common::{Address, Id, PeerRecord, Protocol};
use crate::registry::Descriptor;
use crate::Result;

/// Kind of an event raised by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Compact IPv4 peers found for a search key.
    Values,
    /// Compact IPv6 peers found for a search key.
    Values6,
    /// An IPv4 search finished.
    SearchDone,
    /// An IPv6 search finished.
    SearchDone6,
    /// Any event kind the session does not interpret.
    Other(i32),
}

/// An event raised by the engine for a search key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub key: Id,
    pub payload: Vec<u8>,
}

/// Size of the engine's routing table for one family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    pub good: usize,
    pub dubious: usize,
    pub cached: usize,
    pub incoming: usize,
}

impl NodeCounts {
    pub fn total(&self) -> usize {
        self.good + self.dubious + self.cached + self.incoming
    }
}

/// Operations the session invokes on the engine.
///
/// The engine is not reentrant and is only ever driven from the loop thread.
pub trait Engine {
    /// Initialize with one descriptor per enabled family and this node's id.
    fn init(
        &mut self,
        v4: Option<Descriptor>,
        v6: Option<Descriptor>,
        id: &Id,
        version: [u8; 4],
    ) -> Result<()>;

    /// Process one inbound datagram, or run periodic work when `datagram`
    /// is `None`. Returns how long until the engine wants to be ticked again.
    fn feed(&mut self, host: &mut dyn EngineHost, datagram: Option<(&[u8], &Address)>)
        -> Duration;

    fn ping(&mut self, host: &mut dyn EngineHost, address: &Address);

    /// Insert a node into the routing table as a bootstrap hint.
    fn insert_node(&mut self, host: &mut dyn EngineHost, id: &Id, address: &Address);

    /// Start, or restart, a search for `key`, announcing `port` when non zero.
    fn start_search(&mut self, host: &mut dyn EngineHost, key: &Id, port: u16, protocol: Protocol);

    fn snapshot_counts(&self, protocol: Protocol) -> NodeCounts;

    /// Up to `max` nodes of the routing table for `protocol`.
    fn fetch_snapshot(&self, protocol: Protocol, max: usize) -> Vec<PeerRecord>;

    fn shutdown(&mut self);
}

/// Callbacks the engine makes into the session.
pub trait EngineHost {
    /// Fill `buf` with random bytes, returning how many were written.
    fn random_bytes(&mut self, buf: &mut [u8]) -> usize;

    /// The domain hash, see [crate::hash::dht_hash].
    fn hash(&self, out: &mut [u8], v1: &[u8], v2: &[u8], v3: &[u8]);

    fn is_blacklisted(&self, address: &Address) -> bool;

    /// Send `data` to the native `sockaddr` bytes `target` through `descriptor`.
    fn send(&mut self, descriptor: Descriptor, data: &[u8], target: &[u8]) -> io::Result<usize>;

    fn on_event(&mut self, event: EngineEvent);
}
