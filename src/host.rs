//! Reference host loop over one or two bound sockets.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, trace};

use crate::common::{Address, Protocol};
use crate::engine::Engine;
use crate::session::{Config, DhtSession, Transmitter};
use crate::socket::{Socket, MAX_DATAGRAM_SIZE};
use crate::{Error, Result};

/// Writes engine datagrams to the socket bound for their family.
#[derive(Debug)]
pub struct SocketTransmitter {
    v4: Option<Socket>,
    v6: Option<Socket>,
}

impl SocketTransmitter {
    /// Clone the handles of `sockets`, keeping the first one of each family.
    pub fn new(sockets: &[Socket]) -> Result<Self> {
        let mut transmitter = Self { v4: None, v6: None };

        for socket in sockets {
            let slot = match socket.protocol() {
                Protocol::V4 => &mut transmitter.v4,
                Protocol::V6 => &mut transmitter.v6,
            };
            if slot.is_none() {
                *slot = Some(socket.try_clone()?);
            }
        }

        Ok(transmitter)
    }
}

impl Transmitter for SocketTransmitter {
    fn transmit(&mut self, protocol: Protocol, target: &Address, data: &[u8]) {
        let socket = match protocol {
            Protocol::V4 => self.v4.as_ref(),
            Protocol::V6 => self.v6.as_ref(),
        };

        match socket {
            Some(socket) => socket.send(target, data),
            None => trace!(%protocol, %target, "No socket bound for family"),
        }
    }
}

/// Owns the node's sockets and pumps a [DhtSession] until shutdown.
#[derive(Debug)]
pub struct HostLoop {
    sockets: Vec<Socket>,
}

impl HostLoop {
    pub fn new(sockets: Vec<Socket>) -> Self {
        Self { sockets }
    }

    /// Bind a non-blocking socket on the wildcard address and `port` for every
    /// family enabled in `config`.
    pub fn bind(config: &Config, port: u16) -> Result<Self> {
        if !config.ipv4 && !config.ipv6 {
            return Err(Error::NoTransport);
        }

        let mut sockets = Vec::with_capacity(2);
        if config.ipv4 {
            let address = Address::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
            sockets.push(Socket::bind_to(&address)?);
        }
        if config.ipv6 {
            let address = Address::from(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0));
            sockets.push(Socket::bind_to(&address)?);
        }

        Ok(Self { sockets })
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    /// A transmitter writing through this loop's sockets.
    pub fn transmitter(&self) -> Result<SocketTransmitter> {
        SocketTransmitter::new(&self.sockets)
    }

    /// One iteration: run a frame, wait for traffic for at most the frame's
    /// budget, then feed every pending datagram to the session.
    ///
    /// Returns the number of datagrams fed.
    pub fn run_once<E: Engine>(&self, session: &mut DhtSession<E>, buffer: &mut Vec<u8>) -> usize {
        let budget = session.run_frame();

        let sockets: Vec<&Socket> = self.sockets.iter().collect();
        if !Socket::sleep_sockets(&sockets, budget) {
            return 0;
        }

        let mut fed = 0;
        for socket in &self.sockets {
            while let Some(source) = socket.receive(buffer) {
                session.on_data(socket.protocol(), &source, buffer);
                fed += 1;
            }
        }

        fed
    }

    /// Run until `shutdown` is set. Each iteration waits at most
    /// [crate::session::MAX_FRAME_SLEEP], which bounds the reaction time.
    pub fn run<E: Engine>(&self, session: &mut DhtSession<E>, shutdown: &AtomicBool) {
        let mut buffer = Vec::with_capacity(MAX_DATAGRAM_SIZE);

        info!(
            id = %session.id(),
            ports = ?self.sockets.iter().map(Socket::port).collect::<Vec<_>>(),
            "Host loop started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            self.run_once(session, &mut buffer);
        }

        info!("Host loop stopped");
    }
}
