//! Transport abstraction.
//!
//! The client core never touches a socket: datagrams move through the
//! token-based [`Device`] trait, so the same state machine runs over the
//! OS UDP stack, an embedded network interface or the in-memory
//! [`PacketExchange`] the tests script.

mod exchange;

#[cfg(feature = "std")]
mod udp;

pub use self::exchange::PacketExchange;

#[cfg(feature = "std")]
pub use self::udp::UdpDevice;

/// A description of device capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct DeviceCapabilities {
    /// Largest datagram the device can carry in either direction.
    pub max_transmission_unit: usize,
}

/// Result of an out-of-band reachability check of the remote station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkHealth {
    /// The peer answered a probe.
    Alive,
    /// The peer did not answer a probe.
    Dead,
    /// The device has no probe mechanism.
    Unknown,
}

/// Interface for sending and receiving raw datagrams.
///
/// This interface revolves around _tokens_, specialized types
/// facilitating the reception and transmission of individual datagrams.
/// The `receive` and `transmit` functions construct tokens; the actual
/// transfer happens when a token is consumed.
pub trait Device {
    type RxToken<'a>: RxToken
    where
        Self: 'a;
    type TxToken<'a>: TxToken
    where
        Self: 'a;

    /// Create a pair of tokens, comprising one receive token and one
    /// transmit token.
    ///
    /// The extra transmit token allows answering a datagram using the
    /// information from the received one without further device access.
    fn receive(&mut self) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)>;

    /// Create a transmit token.
    fn transmit(&mut self) -> Option<Self::TxToken<'_>>;

    /// Get a description of device capabilities.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Check reachability of the remote peer, for instance through an
    /// ICMP echo. Devices without such a side channel report
    /// [`LinkHealth::Unknown`].
    fn probe(&mut self) -> LinkHealth {
        LinkHealth::Unknown
    }
}

/// A token to receive a single datagram.
pub trait RxToken {
    /// Utilize the token, invoking the provided closure with the raw
    /// datagram octets.
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R;
}

/// A token to transmit a single datagram.
pub trait TxToken {
    /// Utilize the token to dispatch a single datagram.
    ///
    /// This method creates a transmit buffer of size `len` and invokes
    /// the supplied closure `f` with a mutable reference to it. The
    /// closure fills the buffer with a complete frame; upon its
    /// completion, the buffer is dispatched.
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R;
}
