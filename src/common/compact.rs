//! Compact peer records as returned by the engine's search results.
//!
//! IPv4 records are 6 bytes `{host: 4, port: 2}`, IPv6 records are 18 bytes
//! `{host: 16, port: 2}`, with the port in network byte order and no
//! separators between records.

use std::convert::TryInto;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use crate::common::{Address, Protocol};

pub const SOCKET_ADDR_V4_LEN: usize = 6;
pub const SOCKET_ADDR_V6_LEN: usize = 18;

/// Decode a packed list of compact peers of the given family.
///
/// A trailing partial record is dropped.
pub fn decode_peers(protocol: Protocol, bytes: &[u8]) -> Vec<Address> {
    match protocol {
        Protocol::V4 => bytes
            .chunks_exact(SOCKET_ADDR_V4_LEN)
            .filter_map(decode_v4)
            .collect(),
        Protocol::V6 => bytes
            .chunks_exact(SOCKET_ADDR_V6_LEN)
            .filter_map(decode_v6)
            .collect(),
    }
}

/// Encode a single address in compact form, `None` for an unspecified address.
pub fn encode_peer(address: &Address) -> Option<Vec<u8>> {
    let mut buffer = match address {
        Address::Unspecified => return None,
        Address::V4(addr) => {
            let mut buffer = Vec::with_capacity(SOCKET_ADDR_V4_LEN);
            buffer.extend(addr.ip().octets().as_ref());
            buffer
        }
        Address::V6(addr) => {
            let mut buffer = Vec::with_capacity(SOCKET_ADDR_V6_LEN);
            buffer.extend(addr.ip().octets().as_ref());
            buffer
        }
    };

    buffer.extend(address.port().to_be_bytes().as_ref());
    Some(buffer)
}

fn decode_v4(chunk: &[u8]) -> Option<Address> {
    let ip: [u8; 4] = chunk.get(..4)?.try_into().ok()?;
    let port = u16::from_be_bytes(chunk.get(4..6)?.try_into().ok()?);

    Some(SocketAddrV4::new(Ipv4Addr::from(ip), port).into())
}

fn decode_v6(chunk: &[u8]) -> Option<Address> {
    let ip: [u8; 16] = chunk.get(..16)?.try_into().ok()?;
    let port = u16::from_be_bytes(chunk.get(16..18)?.try_into().ok()?);

    Some(SocketAddrV6::new(Ipv6Addr::from(ip), port, 0, 0).into())
}
