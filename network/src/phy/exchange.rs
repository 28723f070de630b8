use heapless::{Deque, Vec};

use super::{Device, DeviceCapabilities, LinkHealth};
use crate::phy;

/// Largest datagram the exchange carries.
pub const MTU: usize = 128;

const QUEUE_DEPTH: usize = 8;

type Queue = Deque<Vec<u8, MTU>, QUEUE_DEPTH>;

/// An in-memory device.
///
/// Datagrams queued with [`inject`](Self::inject) surface through the
/// receive path; everything transmitted is captured for inspection
/// through [`sent`](Self::sent). The reported link health is scripted
/// with [`set_health`](Self::set_health).
#[derive(Debug, Default)]
pub struct PacketExchange {
    rx: Queue,
    tx: Queue,
    health: Option<LinkHealth>,
}

impl PacketExchange {
    /// Create an exchange reporting [`LinkHealth::Unknown`].
    pub fn new() -> Self {
        Self {
            rx: Queue::new(),
            tx: Queue::new(),
            health: None,
        }
    }

    /// Queue a datagram for reception.
    pub fn inject(&mut self, datagram: &[u8]) {
        let mut buffer = Vec::new();
        if buffer.extend_from_slice(datagram).is_err() {
            net_debug!("exchange: oversized datagram dropped");
            return;
        }
        if self.rx.push_back(buffer).is_err() {
            net_debug!("exchange: rx queue full, datagram dropped");
        }
    }

    /// Take the oldest transmitted datagram, if any.
    pub fn sent(&mut self) -> Option<Vec<u8, MTU>> {
        self.tx.pop_front()
    }

    /// Count of captured, not yet taken, transmitted datagrams.
    pub fn sent_count(&self) -> usize {
        self.tx.len()
    }

    /// Script the link health reported by [`Device::probe`].
    pub fn set_health(&mut self, health: LinkHealth) {
        self.health = Some(health);
    }
}

impl Device for PacketExchange {
    type RxToken<'a> = RxToken;
    type TxToken<'a> = TxToken<'a>;

    fn receive(&mut self) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let buffer = self.rx.pop_front()?;
        Some((RxToken { buffer }, TxToken { queue: &mut self.tx }))
    }

    fn transmit(&mut self) -> Option<Self::TxToken<'_>> {
        Some(TxToken { queue: &mut self.tx })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_transmission_unit: MTU,
            ..DeviceCapabilities::default()
        }
    }

    fn probe(&mut self) -> LinkHealth {
        self.health.unwrap_or(LinkHealth::Unknown)
    }
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
    queue: &'a mut Queue,
}

impl phy::TxToken for TxToken<'_> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer: Vec<u8, MTU> = Vec::new();
        if buffer.resize(len, 0).is_err() {
            net_debug!("exchange: oversized transmit clipped");
        }
        let result = f(&mut buffer[..]);
        if self.queue.push_back(buffer).is_err() {
            net_debug!("exchange: tx queue full, datagram dropped");
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::phy::{RxToken as _, TxToken as _};

    #[test]
    fn injected_datagrams_come_back_in_order() {
        let mut exchange = PacketExchange::new();
        exchange.inject(&[1, 2, 3]);
        exchange.inject(&[4]);

        let (rx, _tx) = exchange.receive().unwrap();
        assert_eq!(rx.consume(|buf| buf.to_vec()), vec![1, 2, 3]);
        let (rx, _tx) = exchange.receive().unwrap();
        assert_eq!(rx.consume(|buf| buf.to_vec()), vec![4]);
        assert!(exchange.receive().is_none());
    }

    #[test]
    fn transmissions_are_captured() {
        let mut exchange = PacketExchange::new();
        let token = exchange.transmit().unwrap();
        token.consume(3, |buf| buf.copy_from_slice(&[9, 8, 7]));

        assert_eq!(exchange.sent().unwrap().as_slice(), &[9, 8, 7]);
        assert!(exchange.sent().is_none());
    }

    #[test]
    fn health_is_scripted() {
        let mut exchange = PacketExchange::new();
        assert_eq!(exchange.probe(), LinkHealth::Unknown);
        exchange.set_health(LinkHealth::Dead);
        assert_eq!(exchange.probe(), LinkHealth::Dead);
    }
}
