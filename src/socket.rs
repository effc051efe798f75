//! Non-blocking UDP endpoint bound to one address family.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Type};
use tracing::{debug, trace};

use crate::common::{Address, Protocol};
use crate::{Error, Result};

/// Largest datagram accepted, anything longer is truncated by the OS.
pub const MAX_DATAGRAM_SIZE: usize = 0x2000;

/// Backoff after a failed poll, so a persistent error does not spin the loop.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(1);

/// A UDP socket for a single address family.
#[derive(Debug)]
pub struct Socket {
    socket: socket2::Socket,
    protocol: Protocol,
    port: u16,
}

impl Socket {
    /// Create an unbound UDP socket. IPv6 sockets do not accept IPv4 traffic.
    pub fn new(protocol: Protocol) -> Result<Self> {
        let domain = match protocol {
            Protocol::V4 => Domain::IPV4,
            Protocol::V6 => Domain::IPV6,
        };

        let socket = socket2::Socket::new(domain, Type::DGRAM, Some(socket2::Protocol::UDP))?;
        if protocol == Protocol::V6 {
            socket.set_only_v6(true)?;
        }

        Ok(Self {
            socket,
            protocol,
            port: 0,
        })
    }

    /// Create a non-blocking socket bound to `address`.
    pub fn bind_to(address: &Address) -> Result<Self> {
        let protocol = address.protocol().ok_or(Error::AddressFamily {
            expected: None,
            found: None,
        })?;

        let mut socket = Self::new(protocol)?;
        socket.set_blocking(false)?;
        socket.bind(address)?;

        Ok(socket)
    }

    // === Getters ===

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Port this socket is bound to, `0` before [Self::bind].
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local_addr(&self) -> Result<Address> {
        let local = self.socket.local_addr()?;
        local
            .as_socket()
            .map(Address::from)
            .ok_or(Error::InvalidAddress)
    }

    // === Public Methods ===

    /// Bind to a local address of this socket's family and record the bound
    /// port, which is the OS assigned one when `address` has port `0`.
    pub fn bind(&mut self, address: &Address) -> Result<()> {
        if address.protocol() != Some(self.protocol) {
            return Err(Error::AddressFamily {
                expected: Some(self.protocol),
                found: address.protocol(),
            });
        }

        self.socket.bind(&address.to_sock_addr()?)?;
        self.port = match self.local_addr() {
            Ok(local) => local.port(),
            Err(_) => address.port(),
        };

        debug!(%address, port = self.port, "Bound socket");
        Ok(())
    }

    pub fn set_blocking(&self, blocking: bool) -> Result<()> {
        self.socket.set_nonblocking(!blocking)?;
        Ok(())
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            protocol: self.protocol,
            port: self.port,
        })
    }

    /// Send a datagram, ignoring failures beyond logging them.
    pub fn send(&self, target: &Address, data: &[u8]) {
        let result = target
            .to_sock_addr()
            .and_then(|to| Ok(self.socket.send_to(data, &to)?));

        if let Err(error) = result {
            debug!(?error, %target, "Error sending datagram");
        }
    }

    /// Receive one datagram into `data`, returning its source.
    ///
    /// Returns `None` when nothing is pending.
    pub fn receive(&self, data: &mut Vec<u8>) -> Option<Address> {
        let mut buf = [MaybeUninit::<u8>::uninit(); MAX_DATAGRAM_SIZE];

        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                // SAFETY: `recv_from` initialized the first `len` bytes of `buf`.
                let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), len) };

                data.clear();
                data.extend_from_slice(bytes);

                Some(from.as_socket().map(Address::from).unwrap_or_default())
            }
            Err(ref error) if error.kind() == io::ErrorKind::WouldBlock => None,
            Err(error) => {
                trace!(
                    context = "socket_error",
                    ?error,
                    "recv_from failed unexpectedly"
                );
                None
            }
        }
    }

    /// Wait until this socket is readable or `timeout` elapses.
    pub fn sleep(&self, timeout: Duration) -> bool {
        Self::sleep_sockets(&[self], timeout)
    }

    pub fn sleep_until(&self, deadline: Instant) -> bool {
        Self::sleep_sockets_until(&[self], deadline)
    }

    /// Wait until any of `sockets` is readable or `timeout` elapses.
    ///
    /// Returns `true` when data is ready, `false` on timeout or when polling
    /// failed.
    pub fn sleep_sockets(sockets: &[&Socket], timeout: Duration) -> bool {
        let mut fds: Vec<libc::pollfd> = sockets
            .iter()
            .map(|socket| libc::pollfd {
                fd: socket.socket.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let millis = timeout.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128);

        // SAFETY: `fds` is an exclusively borrowed array of `fds.len()` pollfd.
        let ready =
            unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis as libc::c_int) };

        if ready < 0 {
            trace!(
                context = "socket_error",
                error = ?io::Error::last_os_error(),
                "poll failed"
            );
            thread::sleep(POLL_ERROR_BACKOFF);
            return false;
        }

        ready > 0
    }

    pub fn sleep_sockets_until(sockets: &[&Socket], deadline: Instant) -> bool {
        Self::sleep_sockets(sockets, deadline.saturating_duration_since(Instant::now()))
    }
}
