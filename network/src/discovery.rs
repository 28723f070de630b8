//! Subnet discovery.
//!
//! Stations answer a hardware-info request even when it arrives as a
//! broadcast, which makes that request double as a discovery probe.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};

use z21_core::station::{FirmwareVersion, HardwareInfo, HardwareType};

use crate::config;
use crate::time::Duration;
use crate::wire::{construct, headers, Datagrams, Frame};

/// A station that answered the discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredStation {
    pub addr: IpAddr,
    pub hardware_info: HardwareInfo,
}

/// Probe the local subnet for stations.
///
/// Broadcasts a hardware-info request to the protocol port and collects
/// answers until `timeout` (see [`config::DISCOVERY_TIMEOUT`] for the
/// customary budget) has passed. Stations are deduplicated by source
/// address. Run this before connecting: a station only serves a handful
/// of clients, and a discovery socket counts against that.
pub fn query_for_z21s(timeout: Duration) -> io::Result<Vec<DiscoveredStation>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_broadcast(true)?;

    let probe = construct::station::get_hardware_info();
    socket.send_to(&probe[..], (Ipv4Addr::BROADCAST, config::Z21_PORT))?;

    let mut stations: Vec<DiscoveredStation> = Vec::new();
    let deadline = std::time::Instant::now() + std::time::Duration::from(timeout);
    let mut buffer = [0u8; 512];

    loop {
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;

        match socket.recv_from(&mut buffer) {
            Ok((size, source)) => {
                for frame in Datagrams::new(&buffer[..size]).flatten() {
                    let Some(hardware_info) = decode_station(&frame) else {
                        continue;
                    };
                    if stations.iter().any(|station| station.addr == source.ip()) {
                        continue;
                    }
                    net_debug!("discovery: station answered");
                    stations.push(DiscoveredStation {
                        addr: source.ip(),
                        hardware_info,
                    });
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(stations)
}

/// Lenient hardware-info decode for discovery answers.
///
/// Some firmware answers the broadcast probe with the hardware type
/// only; the version word is read when present.
fn decode_station(frame: &Frame<&[u8]>) -> Option<HardwareInfo> {
    if frame.header() != headers::GET_HWINFO || frame.total_len() < 8 {
        return None;
    }
    let payload = frame.payload();
    let firmware = if payload.len() >= 8 {
        FirmwareVersion::from_bcd(LittleEndian::read_u32(&payload[4..8]))
    } else {
        FirmwareVersion::new(0, 0)
    };
    Some(HardwareInfo {
        hardware_type: HardwareType::from(LittleEndian::read_u32(&payload[..4])),
        firmware,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discovery_answers_decode_leniently() {
        let full = [
            0x0C, 0x00, 0x1A, 0x00, 0x11, 0x02, 0x00, 0x00, 0x43, 0x01, 0x00, 0x00,
        ];
        let frame = Frame::new_checked(&full[..]).unwrap();
        assert_eq!(
            decode_station(&frame),
            Some(HardwareInfo {
                hardware_type: HardwareType::Z21Xl,
                firmware: FirmwareVersion::new(1, 43),
            })
        );

        let short = [0x08, 0x00, 0x1A, 0x00, 0x01, 0x02, 0x00, 0x00];
        let frame = Frame::new_checked(&short[..]).unwrap();
        assert_eq!(
            decode_station(&frame).unwrap().firmware,
            FirmwareVersion::new(0, 0)
        );

        let foreign = [0x08, 0x00, 0x10, 0x00, 0x40, 0xE2, 0x01, 0x00];
        let frame = Frame::new_checked(&foreign[..]).unwrap();
        assert_eq!(decode_station(&frame), None);
    }
}
