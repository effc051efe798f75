use crate::common::{Address, Protocol};

/// Host side of outbound traffic: writes one engine datagram to the wire.
///
/// The session never touches sockets itself, so the host decides how the
/// two families map onto its transports.
pub trait Transmitter {
    fn transmit(&mut self, protocol: Protocol, target: &Address, data: &[u8]);
}

impl<F> Transmitter for F
where
    F: FnMut(Protocol, &Address, &[u8]),
{
    fn transmit(&mut self, protocol: Protocol, target: &Address, data: &[u8]) {
        self(protocol, target, data)
    }
}
