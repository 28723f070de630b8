use core::fmt;

use num_enum::FromPrimitive;

/// Size of a turnout address in octets.
pub const ADDR_SIZE: usize = 2;

/// A turnout (accessory decoder) address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TurnoutAddress(u16);

impl TurnoutAddress {
    pub const fn new(addr: u16) -> Self {
        Self(addr)
    }

    /// Return the numeric address value.
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Construct an address from two octets in big-endian.
    pub const fn from_bytes(msb: u8, lsb: u8) -> Self {
        Self(((msb as u16) << 8) | lsb as u16)
    }

    /// Return the address as two octets in big-endian.
    pub const fn as_bytes(&self) -> [u8; ADDR_SIZE] {
        self.0.to_be_bytes()
    }
}

impl From<u16> for TurnoutAddress {
    fn from(addr: u16) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for TurnoutAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a turnout, from the low two bits of a turnout-info answer.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TurnoutPosition {
    /// Not switched since power-up.
    NotSwitched = 0,
    Position1 = 1,
    Position2 = 2,
    /// Both outputs reported active.
    #[num_enum(default)]
    Invalid = 3,
}

impl TurnoutPosition {
    /// The output selector bit of a switching command, when this position
    /// is one a command can request.
    pub const fn output(&self) -> Option<u8> {
        match self {
            TurnoutPosition::Position1 => Some(0),
            TurnoutPosition::Position2 => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_round_trips_big_endian() {
        let addr = TurnoutAddress::new(0x0102);
        assert_eq!(addr.as_bytes(), [0x01, 0x02]);
        assert_eq!(TurnoutAddress::from_bytes(0x01, 0x02), addr);
    }

    #[test]
    fn positions_decode_from_state_bits() {
        assert_eq!(TurnoutPosition::from(0u8), TurnoutPosition::NotSwitched);
        assert_eq!(TurnoutPosition::from(1u8), TurnoutPosition::Position1);
        assert_eq!(TurnoutPosition::from(2u8), TurnoutPosition::Position2);
        assert_eq!(TurnoutPosition::from(3u8), TurnoutPosition::Invalid);
    }

    #[test]
    fn only_real_positions_have_an_output() {
        assert_eq!(TurnoutPosition::Position1.output(), Some(0));
        assert_eq!(TurnoutPosition::Position2.output(), Some(1));
        assert_eq!(TurnoutPosition::NotSwitched.output(), None);
        assert_eq!(TurnoutPosition::Invalid.output(), None);
    }
}
