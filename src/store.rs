//! Persisted node identity and peer cache.
//!
//! Layout, counts little-endian and ports in network byte order:
//!
//! ```text
//! id          20 bytes
//! ipv4_count  u32
//! ipv6_count  u32
//! ipv4_count × { id: 20, host: 4, port: 2 }
//! ipv6_count × { id: 20, host: 16, port: 2 }
//! ```

use std::convert::TryInto;
use std::fs;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::path::Path;

use tracing::{debug, warn};

use crate::common::{Address, Id, PeerRecord, ID_SIZE};
use crate::{Error, Result};

/// Default location of the peer store, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = "dht_peers.dat";

const HEADER_LEN: usize = ID_SIZE + 4 + 4;
const V4_RECORD_LEN: usize = ID_SIZE + 4 + 2;
const V6_RECORD_LEN: usize = ID_SIZE + 16 + 2;
/// Counts are stored as `u32`, records past this per family are not saved.
const MAX_RECORDS: usize = u32::MAX as usize;

/// This node's identity and the last known set of peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStore {
    pub id: Id,
    pub peers: Vec<PeerRecord>,
}

impl PeerStore {
    pub fn new(id: Id) -> Self {
        Self { id, peers: vec![] }
    }

    /// A random identity and no peers.
    pub fn fresh() -> Self {
        Self::new(Id::random())
    }

    // === Codec ===

    /// Encode to the on-disk layout, IPv4 records first.
    ///
    /// Records with an unspecified address are skipped, as are records past
    /// `u32::MAX` per family.
    pub fn encode(&self) -> Vec<u8> {
        let v4: Vec<_> = self
            .peers
            .iter()
            .filter(|peer| peer.address.is_ipv4())
            .take(MAX_RECORDS)
            .collect();
        let v6: Vec<_> = self
            .peers
            .iter()
            .filter(|peer| peer.address.is_ipv6())
            .take(MAX_RECORDS)
            .collect();

        let mut buffer =
            Vec::with_capacity(HEADER_LEN + v4.len() * V4_RECORD_LEN + v6.len() * V6_RECORD_LEN);

        buffer.extend(self.id.as_bytes());
        buffer.extend(record_count(v4.len()).to_le_bytes());
        buffer.extend(record_count(v6.len()).to_le_bytes());

        for peer in v4.iter().chain(v6.iter()) {
            buffer.extend(peer.id.as_bytes());
            match peer.address {
                Address::V4(addr) => buffer.extend(addr.ip().octets()),
                Address::V6(addr) => buffer.extend(addr.ip().octets()),
                Address::Unspecified => {}
            }
            buffer.extend(peer.address.port().to_be_bytes());
        }

        buffer
    }

    /// Decode the on-disk layout, failing with [Error::CorruptStore] on truncation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader { bytes };

        let id = Id::from_bytes(reader.take(ID_SIZE, "truncated node id")?)?;
        let v4_count = reader.u32("truncated ipv4 count")? as usize;
        let v6_count = reader.u32("truncated ipv6 count")? as usize;

        reader.expect_records(v4_count, V4_RECORD_LEN, "truncated ipv4 records")?;
        let mut peers = Vec::with_capacity(v4_count);

        for _ in 0..v4_count {
            let id = Id::from_bytes(reader.take(ID_SIZE, "truncated ipv4 record")?)?;
            let ip: [u8; 4] = reader.array("truncated ipv4 record")?;
            let port = reader.port("truncated ipv4 record")?;

            peers.push(PeerRecord::new(
                id,
                SocketAddrV4::new(Ipv4Addr::from(ip), port).into(),
            ));
        }

        reader.expect_records(v6_count, V6_RECORD_LEN, "truncated ipv6 records")?;
        peers.reserve(v6_count);

        for _ in 0..v6_count {
            let id = Id::from_bytes(reader.take(ID_SIZE, "truncated ipv6 record")?)?;
            let ip: [u8; 16] = reader.array("truncated ipv6 record")?;
            let port = reader.port("truncated ipv6 record")?;

            peers.push(PeerRecord::new(
                id,
                SocketAddrV6::new(Ipv6Addr::from(ip), port, 0, 0).into(),
            ));
        }

        Ok(Self { id, peers })
    }

    // === Files ===

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.encode())?;
        debug!(
            ?path,
            id = %self.id,
            peers = self.peers.len(),
            "Saved peer store"
        );
        Ok(())
    }

    /// Load the store at `path`, or create, persist and return a fresh one if
    /// it is missing or unreadable.
    pub fn load_or_create(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => {
                debug!(?path, id = %store.id, peers = store.peers.len(), "Loaded peer store");
                return store;
            }
            Err(Error::IO(error)) if error.kind() == ErrorKind::NotFound => {
                debug!(?path, "No peer store, generating a new identity");
            }
            Err(error) => {
                warn!(?path, ?error, "Discarding unreadable peer store");
            }
        }

        let store = Self::fresh();
        if let Err(error) = store.save(path) {
            warn!(?path, ?error, "Failed to persist fresh peer store");
        }

        store
    }
}

fn record_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, reason: &'static str) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            return Err(Error::CorruptStore(reason));
        }

        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, reason: &'static str) -> Result<[u8; N]> {
        self.take(N, reason)?
            .try_into()
            .map_err(|_| Error::CorruptStore(reason))
    }

    fn u32(&mut self, reason: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(reason)?))
    }

    fn port(&mut self, reason: &'static str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(reason)?))
    }

    /// Fail early when the declared records cannot fit the remaining bytes.
    fn expect_records(&self, count: usize, record_len: usize, reason: &'static str) -> Result<()> {
        match count.checked_mul(record_len) {
            Some(len) if len <= self.bytes.len() => Ok(()),
            _ => Err(Error::CorruptStore(reason)),
        }
    }
}
