//! Main Crate Error

use crate::common::Protocol;
use crate::registry::Descriptor;

#[derive(thiserror::Error, Debug)]
/// Mainline session crate error enum.
pub enum Error {
    /// Another [crate::DhtSession] already holds the engine in this process.
    #[error("Only one DHT session supported at a time")]
    AlreadyActive,

    /// Raw native address bytes had the wrong length or an unsupported family.
    #[error("Invalid network address")]
    InvalidAddress,

    /// A family specific field was read or written on an address of another family.
    #[error("Address family mismatch: expected {expected:?}, found {found:?}")]
    AddressFamily {
        expected: Option<Protocol>,
        found: Option<Protocol>,
    },

    /// Host name did not resolve to any IPv4 or IPv6 address.
    #[error("Could not resolve {0}")]
    Resolve(String),

    /// Peer store bytes are truncated or otherwise malformed.
    #[error("Corrupt peer store: {0}")]
    CorruptStore(&'static str),

    /// Indicates that an id is not 20 bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// The engine asked to send through a descriptor this session did not register.
    #[error("Unknown descriptor: {0}")]
    UnknownDescriptor(Descriptor),

    /// Neither IPv4 nor IPv6 was enabled in [crate::Config].
    #[error("At least one of IPv4 or IPv6 must be enabled")]
    NoTransport,

    /// The engine refused an operation.
    #[error("Engine error: {0}")]
    Engine(String),

    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),
}
