//! Family tagged socket address shared by the socket layer, the engine contract and the peer store.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::net::{
    Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs,
};

use socket2::SockAddr;

use crate::{Error, Result};

/// Address family of a transport, an [Address] or a synthetic descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    V4,
    V6,
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::V4 => write!(f, "IPv4"),
            Protocol::V6 => write!(f, "IPv6"),
        }
    }
}

/// A UDP endpoint that is either unspecified, IPv4 or IPv6.
///
/// Equality and hashing only consider the family, the port and the host
/// bytes, so IPv6 flow info and scope ids do not make two addresses differ.
#[derive(Debug, Clone, Copy, Default)]
pub enum Address {
    #[default]
    Unspecified,
    V4(SocketAddrV4),
    V6(SocketAddrV6),
}

impl Address {
    /// Parse `"host[:port]"`, resolving `host` through DNS and keeping the first
    /// IPv4 or IPv6 result.
    ///
    /// IPv6 literals may be written bare (`::1`) or bracketed (`[::1]:6881`).
    /// A missing port leaves the port at `0`.
    pub fn parse(addr: &str) -> Result<Address> {
        let (host, port) = split_host_port(addr);

        let mut address = resolve_host(host)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Resolve(host.to_string()))?;

        if let Some(port) = port {
            address.set_port(port)?;
        }

        Ok(address)
    }

    /// Resolve `"host[:port]"` to every matching IPv4 and IPv6 address.
    pub fn resolve_all(addr: &str) -> Result<Vec<Address>> {
        let (host, port) = split_host_port(addr);

        let mut addresses = resolve_host(host)?;
        if let Some(port) = port {
            for address in addresses.iter_mut() {
                address.set_port(port)?;
            }
        }

        Ok(addresses)
    }

    /// Read an address from its native `sockaddr` representation.
    ///
    /// `bytes` must be at least a full `sockaddr_in` tagged `AF_INET`, or
    /// exactly a `sockaddr_in6` tagged `AF_INET6`.
    pub fn from_native(bytes: &[u8]) -> Result<Address> {
        if bytes.len() > mem::size_of::<libc::sockaddr_storage>() {
            return Err(Error::InvalidAddress);
        }

        // SAFETY: at most `size_of::<sockaddr_storage>()` bytes are copied into
        // the zeroed storage handed to us, and the length written back matches.
        let ((), native) = unsafe {
            SockAddr::try_init(|storage, len| {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), storage.cast::<u8>(), bytes.len());
                *len = bytes.len() as libc::socklen_t;
                Ok(())
            })
        }?;

        let family = native.family() as libc::c_int;

        if family == libc::AF_INET && bytes.len() >= mem::size_of::<libc::sockaddr_in>() {
            if let Some(addr) = native.as_socket_ipv4() {
                return Ok(Address::V4(addr));
            }
        } else if family == libc::AF_INET6 && bytes.len() == mem::size_of::<libc::sockaddr_in6>() {
            if let Some(addr) = native.as_socket_ipv6() {
                return Ok(Address::V6(addr));
            }
        }

        Err(Error::InvalidAddress)
    }

    /// Serialize to the native `sockaddr` bytes handed to the transport layer.
    pub fn to_native(&self) -> Result<Vec<u8>> {
        let native = self.to_sock_addr()?;

        // SAFETY: `as_ptr` points at storage owned by `native` that is valid for
        // `len` bytes while `native` is alive.
        let bytes =
            unsafe { std::slice::from_raw_parts(native.as_ptr().cast::<u8>(), native.len() as usize) };

        Ok(bytes.to_vec())
    }

    pub(crate) fn to_sock_addr(&self) -> Result<SockAddr> {
        self.to_socket_addr()
            .map(SockAddr::from)
            .ok_or(Error::AddressFamily {
                expected: None,
                found: None,
            })
    }

    /// Size of the native representation for this family.
    pub fn native_len(&self) -> usize {
        match self {
            Address::Unspecified => mem::size_of::<libc::sockaddr>(),
            Address::V4(_) => mem::size_of::<libc::sockaddr_in>(),
            Address::V6(_) => mem::size_of::<libc::sockaddr_in6>(),
        }
    }

    // === Getters ===

    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            Address::Unspecified => None,
            Address::V4(_) => Some(Protocol::V4),
            Address::V6(_) => Some(Protocol::V6),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, Address::V4(_))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Address::V6(_))
    }

    pub fn is_supported(&self) -> bool {
        self.protocol().is_some()
    }

    /// Port in host byte order, `0` for an unspecified address.
    pub fn port(&self) -> u16 {
        match self {
            Address::Unspecified => 0,
            Address::V4(addr) => addr.port(),
            Address::V6(addr) => addr.port(),
        }
    }

    pub fn ipv4(&self) -> Result<Ipv4Addr> {
        match self {
            Address::V4(addr) => Ok(*addr.ip()),
            _ => Err(self.mismatch(Protocol::V4)),
        }
    }

    pub fn ipv6(&self) -> Result<Ipv6Addr> {
        match self {
            Address::V6(addr) => Ok(*addr.ip()),
            _ => Err(self.mismatch(Protocol::V6)),
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Address::Unspecified => None,
            Address::V4(addr) => Some(SocketAddr::V4(*addr)),
            Address::V6(addr) => Some(SocketAddr::V6(*addr)),
        }
    }

    // === Setters ===

    /// Turn this into an IPv4 address with the given host and port `0`.
    pub fn set_ipv4(&mut self, ip: Ipv4Addr) {
        *self = Address::V4(SocketAddrV4::new(ip, 0));
    }

    /// Turn this into an IPv6 address with the given host and port `0`.
    pub fn set_ipv6(&mut self, ip: Ipv6Addr) {
        *self = Address::V6(SocketAddrV6::new(ip, 0, 0, 0));
    }

    /// Set the port, which requires a family to be set first.
    pub fn set_port(&mut self, port: u16) -> Result<()> {
        match self {
            Address::V4(addr) => addr.set_port(port),
            Address::V6(addr) => addr.set_port(port),
            Address::Unspecified => {
                return Err(Error::AddressFamily {
                    expected: None,
                    found: None,
                })
            }
        }

        Ok(())
    }

    /// Returns `true` for RFC1918 private ranges and IPv4 loopback.
    ///
    /// IPv6 addresses are never classified as local.
    pub fn is_local(&self) -> bool {
        match self {
            Address::V4(addr) => addr.ip().is_private() || addr.ip().is_loopback(),
            _ => false,
        }
    }

    fn mismatch(&self, expected: Protocol) -> Error {
        Error::AddressFamily {
            expected: Some(expected),
            found: self.protocol(),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(addr) => Address::V4(addr),
            SocketAddr::V6(addr) => Address::V6(addr),
        }
    }
}

impl From<SocketAddrV4> for Address {
    fn from(addr: SocketAddrV4) -> Self {
        Address::V4(addr)
    }
}

impl From<SocketAddrV6> for Address {
    fn from(addr: SocketAddrV6) -> Self {
        Address::V6(addr)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Address::V4(a), Address::V4(b)) => a.port() == b.port() && a.ip() == b.ip(),
            (Address::V6(a), Address::V6(b)) => a.port() == b.port() && a.ip() == b.ip(),
            (Address::Unspecified, Address::Unspecified) => true,
            _ => false,
        }
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocol().hash(state);
        self.port().hash(state);

        match self {
            Address::Unspecified => {}
            Address::V4(addr) => addr.ip().octets().hash(state),
            Address::V6(addr) => addr.ip().octets().hash(state),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unspecified => write!(f, "?:0"),
            Address::V4(addr) => write!(f, "{}:{}", addr.ip(), addr.port()),
            Address::V6(addr) => write!(f, "[{}]:{}", addr.ip(), addr.port()),
        }
    }
}

/// Split `"host[:port]"`, where an unparsable port reads as `0`.
fn split_host_port(addr: &str) -> (&str, Option<u16>) {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .map(|port| port.parse().unwrap_or(0));
            return (host, port);
        }
    }

    // Bare IPv6 literal, its colons are not a port separator.
    if addr.parse::<Ipv6Addr>().is_ok() {
        return (addr, None);
    }

    match addr.rsplit_once(':') {
        Some((host, port)) => (host, Some(port.parse().unwrap_or(0))),
        None => (addr, None),
    }
}

fn resolve_host(host: &str) -> Result<Vec<Address>> {
    let addresses: Vec<Address> = (host, 0)
        .to_socket_addrs()
        .map_err(|_| Error::Resolve(host.to_string()))?
        .map(Address::from)
        .collect();

    if addresses.is_empty() {
        return Err(Error::Resolve(host.to_string()));
    }

    Ok(addresses)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn parse_literals() {
        let v4 = Address::parse("203.0.113.5:6881").unwrap();
        assert_eq!(v4.ipv4().unwrap(), Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(v4.port(), 6881);

        let no_port = Address::parse("0.0.0.0").unwrap();
        assert!(no_port.is_ipv4());
        assert_eq!(no_port.port(), 0);

        let v6 = Address::parse("[::1]:4000").unwrap();
        assert_eq!(v6.ipv6().unwrap(), Ipv6Addr::LOCALHOST);
        assert_eq!(v6.port(), 4000);

        let bare_v6 = Address::parse("::1").unwrap();
        assert!(bare_v6.is_ipv6());
        assert_eq!(bare_v6.port(), 0);
    }

    #[test]
    fn parse_localhost_name() {
        let address = Address::parse("localhost:9000").unwrap();
        assert!(address.is_supported());
        assert_eq!(address.port(), 9000);
    }

    #[test]
    fn parse_unresolvable() {
        assert!(matches!(
            Address::parse("name.invalid:6881"),
            Err(Error::Resolve(_))
        ));
    }

    #[test]
    fn family_mismatch() {
        let v4 = Address::from(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1));

        assert!(matches!(
            v4.ipv6(),
            Err(Error::AddressFamily {
                expected: Some(Protocol::V6),
                found: Some(Protocol::V4)
            })
        ));

        let mut unspecified = Address::default();
        assert!(unspecified.set_port(10).is_err());
        assert!(unspecified.ipv4().is_err());
        assert_eq!(unspecified.port(), 0);
    }

    #[test]
    fn set_host_resets_port() {
        let mut address = Address::parse("10.0.0.1:80").unwrap();

        address.set_ipv6(Ipv6Addr::LOCALHOST);
        assert!(address.is_ipv6());
        assert_eq!(address.port(), 0);

        address.set_port(443).unwrap();
        address.set_ipv4(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(address.to_string(), "1.2.3.4:0");
    }

    #[test]
    fn native_round_trip() {
        let addresses = [
            Address::from(SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 6881)),
            Address::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            Address::from(SocketAddrV6::new(
                "2001:db8::7".parse().unwrap(),
                51413,
                3,
                0,
            )),
        ];

        for address in addresses {
            let native = address.to_native().unwrap();
            assert_eq!(native.len(), address.native_len());

            let decoded = Address::from_native(&native).unwrap();
            assert_eq!(decoded, address);
            assert_eq!(decoded.to_native().unwrap(), native);
        }
    }

    #[test]
    fn native_rejects_bad_input() {
        assert!(matches!(
            Address::from_native(&[]),
            Err(Error::InvalidAddress)
        ));

        let v4 = Address::parse("1.2.3.4:5").unwrap().to_native().unwrap();
        assert!(Address::from_native(&v4[..v4.len() - 1]).is_err());

        let v6 = Address::parse("[::1]:5").unwrap().to_native().unwrap();
        assert!(Address::from_native(&v6[..v6.len() - 1]).is_err());

        assert!(Address::default().to_native().is_err());
    }

    #[test]
    fn equality_ignores_scope() {
        let ip: Ipv6Addr = "fe80::1".parse().unwrap();
        let a = Address::from(SocketAddrV6::new(ip, 80, 0, 1));
        let b = Address::from(SocketAddrV6::new(ip, 80, 9, 2));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));

        assert_ne!(a, Address::from(SocketAddrV6::new(ip, 81, 0, 1)));
        assert_eq!(Address::default(), Address::default());
        assert_ne!(Address::default(), Address::parse("0.0.0.0").unwrap());
    }

    #[test]
    fn locality() {
        for local in ["10.1.2.3", "192.168.0.10", "172.16.0.1", "172.31.255.1", "127.0.0.1"] {
            assert!(Address::parse(local).unwrap().is_local(), "{local}");
        }

        for remote in ["172.32.0.1", "8.8.8.8", "::1"] {
            assert!(!Address::parse(remote).unwrap().is_local(), "{remote}");
        }
    }

    #[test]
    fn display() {
        assert_eq!(
            Address::parse("203.0.113.5:6881").unwrap().to_string(),
            "203.0.113.5:6881"
        );
        assert_eq!(Address::parse("[::1]:80").unwrap().to_string(), "[::1]:80");
        assert_eq!(Address::default().to_string(), "?:0");
    }
}
