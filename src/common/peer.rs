//! Known remote node, as snapshotted from the engine's routing table
use crate::common::{Address, Id};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A remote node's id and its last known address.
pub struct PeerRecord {
    pub id: Id,
    pub address: Address,
}

impl PeerRecord {
    /// Creates a new PeerRecord from an id and an address.
    pub fn new(id: Id, address: Address) -> PeerRecord {
        PeerRecord { id, address }
    }
}
