use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use heapless::Vec;

use super::{Device, DeviceCapabilities};
use crate::config;
use crate::phy;

/// Largest datagram accepted from or handed to the OS socket.
pub const MTU: usize = 512;

/// A [`Device`] backed by an OS UDP socket bound to one station.
///
/// The socket is non-blocking: an empty receive queue surfaces as
/// `receive()` returning `None`, which fits the polled client. Datagrams
/// from any other IP address than the station's are dropped; the source
/// port is not checked because stations answer discovery probes from
/// changing ports.
#[derive(Debug)]
pub struct UdpDevice {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpDevice {
    /// Resolve `host`, bind a local UDP socket and point the device at
    /// the station.
    ///
    /// The local socket prefers the protocol port and falls back to an
    /// ephemeral one when it is taken, for instance by a second client
    /// on the same machine.
    pub fn connect(host: &str, port: Option<u16>) -> io::Result<UdpDevice> {
        let port = port.unwrap_or(config::Z21_PORT);
        let remote = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "host did not resolve")
            })?;

        let socket = match UdpSocket::bind(("0.0.0.0", config::Z21_PORT)) {
            Ok(socket) => socket,
            Err(_) => {
                net_debug!("phy: protocol port taken, binding ephemeral");
                UdpSocket::bind(("0.0.0.0", 0))?
            }
        };
        socket.set_nonblocking(true)?;

        Ok(UdpDevice { socket, remote })
    }

    /// The station endpoint this device talks to.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// The local endpoint of the socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Device for UdpDevice {
    type RxToken<'a> = RxToken;
    type TxToken<'a> = TxToken<'a>;

    fn receive(&mut self) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut storage = [0u8; MTU];
        loop {
            match self.socket.recv_from(&mut storage) {
                Ok((size, source)) => {
                    if source.ip() != self.remote.ip() {
                        net_debug!("phy: dropping datagram from foreign source");
                        continue;
                    }
                    let mut buffer = Vec::new();
                    if buffer.extend_from_slice(&storage[..size]).is_err() {
                        net_debug!("phy: oversized datagram dropped");
                        continue;
                    }
                    let rx = RxToken { buffer };
                    let tx = TxToken {
                        socket: &self.socket,
                        remote: self.remote,
                    };
                    return Some((rx, tx));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return None,
                Err(_) => {
                    net_debug!("phy: receive error");
                    return None;
                }
            }
        }
    }

    fn transmit(&mut self) -> Option<Self::TxToken<'_>> {
        Some(TxToken {
            socket: &self.socket,
            remote: self.remote,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_transmission_unit: MTU,
            ..DeviceCapabilities::default()
        }
    }

    // The default probe applies: an unprivileged process has no ICMP
    // echo. The watchdog treats the inconclusive answer as no evidence
    // either way and keeps quiet sessions alive.
}

#[doc(hidden)]
pub struct RxToken {
    buffer: Vec<u8, MTU>,
}

impl phy::RxToken for RxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(&mut self.buffer[..])
    }
}

#[doc(hidden)]
pub struct TxToken<'a> {
    socket: &'a UdpSocket,
    remote: SocketAddr,
}

impl phy::TxToken for TxToken<'_> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = [0u8; MTU];
        let len = len.min(MTU);
        let result = f(&mut buffer[..len]);
        if self.socket.send_to(&buffer[..len], self.remote).is_err() {
            net_debug!("phy: transmit failed, command dropped");
        }
        result
    }
}
