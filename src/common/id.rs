//! Node Id or a search key
use rand::Rng;
use std::fmt::{self, Debug, Display, Formatter};

use crate::{hash, Error, Result};

/// The size of node IDs and search keys in bytes.
pub const ID_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Ord, PartialOrd, Eq, Hash, Default)]
/// Node Id in the DHT keyspace, or a search key (info-hash or hashed keyword).
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    /// Generate a fresh identity by hashing random bytes.
    pub fn random() -> Id {
        let mut rng = rand::thread_rng();
        let seed: [u8; 32] = rng.gen();

        let mut bytes = [0; ID_SIZE];
        hash::dht_hash(&mut bytes, &seed, &[], &[]);

        Id(bytes)
    }

    /// Search key for a keyword, the domain hash of its UTF-8 bytes.
    pub fn from_keyword(keyword: &str) -> Id {
        let mut bytes = [0; ID_SIZE];
        hash::dht_hash(&mut bytes, keyword.as_bytes(), &[], &[]);

        Id(bytes)
    }

    /// Create a new Id from some bytes. Returns Err if `bytes` is not of length
    /// [ID_SIZE].
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Id> {
        let bytes = bytes.as_ref();
        if bytes.len() != ID_SIZE {
            return Err(Error::InvalidIdSize(bytes.len()));
        }

        let mut tmp: [u8; ID_SIZE] = [0; ID_SIZE];
        tmp.copy_from_slice(bytes);

        Ok(Id(tmp))
    }

    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl From<[u8; ID_SIZE]> for Id {
    fn from(bytes: [u8; ID_SIZE]) -> Self {
        Id(bytes)
    }
}

impl AsRef<[u8]> for Id {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_bytes_checks_length() {
        assert!(matches!(
            Id::from_bytes([0; 19]),
            Err(Error::InvalidIdSize(19))
        ));

        let id = Id::from_bytes([7; ID_SIZE]).unwrap();
        assert_eq!(id, Id([7; ID_SIZE]));
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn keyword_is_stable() {
        assert_eq!(Id::from_keyword("X-LABS"), Id::from_keyword("X-LABS"));
        assert_ne!(Id::from_keyword("X-LABS"), Id::from_keyword("X-LABs"));
    }

    #[test]
    fn display_hex() {
        let mut bytes = [0; ID_SIZE];
        bytes[0] = 0xab;
        bytes[19] = 0x01;

        assert_eq!(
            Id(bytes).to_string(),
            "ab00000000000000000000000000000000000001"
        );
    }
}
