use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Size of a locomotive address in octets.
pub const ADDR_SIZE: usize = 2;

/// A 14-bit locomotive address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocoAddress(u16);

impl LocoAddress {
    /// Construct a locomotive address. The value is truncated to 14 bits.
    pub const fn new(addr: u16) -> Self {
        Self(addr & 0x3FFF)
    }

    /// Return the numeric address value.
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Construct an address from the two octets of an X-Bus loco frame.
    ///
    /// The top two bits of the most significant octet carry format flags
    /// and are not part of the address.
    pub const fn from_xbus_bytes(msb: u8, lsb: u8) -> Self {
        Self((((msb & 0x3F) as u16) << 8) | lsb as u16)
    }

    /// Return the address as two octets for an X-Bus command.
    ///
    /// Addresses of 128 and above have bits 6,7 of the most significant
    /// octet set to 1.
    pub fn as_xbus_bytes(&self) -> [u8; ADDR_SIZE] {
        let mut bytes = self.0.to_be_bytes();
        if self.0 >= 128 {
            bytes[0] |= 0xC0;
        }
        bytes
    }

    /// Return the raw address as two octets in big-endian.
    ///
    /// Used by the loco-mode commands, which take the address unmasked.
    pub const fn as_raw_bytes(&self) -> [u8; ADDR_SIZE] {
        self.0.to_be_bytes()
    }
}

impl From<u16> for LocoAddress {
    fn from(addr: u16) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for LocoAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track output protocol of a decoder.
///
/// The command station drives each locomotive and turnout decoder either
/// with DCC or with the older Märklin Motorola format.
#[derive(TryFromPrimitive, IntoPrimitive, Debug, Clone, PartialEq, Eq, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DecoderProtocol {
    Dcc = 0,
    Motorola = 1,
}

/// Drive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Decode from the direction bit of a speed octet (1 = forward).
    pub const fn from_bit(bit: bool) -> Self {
        if bit {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    /// The direction bit as used in speed octets.
    pub const fn bit(&self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 0,
        }
    }
}

/// Speed-step count as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NativeSpeedSteps {
    Steps14,
    Steps28,
    Steps128,
    Unknown,
}

impl NativeSpeedSteps {
    /// Decode from the low three bits of a loco-info DB0 octet.
    pub const fn from_db0(db0: u8) -> Self {
        match db0 & 0x07 {
            0 => NativeSpeedSteps::Steps14,
            2 => NativeSpeedSteps::Steps28,
            4 => NativeSpeedSteps::Steps128,
            _ => NativeSpeedSteps::Unknown,
        }
    }

    /// The DB0 selector octet of a loco drive command.
    pub const fn drive_db0(&self) -> Option<u8> {
        match self {
            NativeSpeedSteps::Steps14 => Some(0x10),
            NativeSpeedSteps::Steps28 => Some(0x12),
            NativeSpeedSteps::Steps128 => Some(0x13),
            NativeSpeedSteps::Unknown => None,
        }
    }

    /// The largest drivable speed value in this range.
    ///
    /// The 128-step range carries 126 speeds: two of the 128 wire codes
    /// are taken by stop and emergency stop.
    pub const fn max_speed(&self) -> Option<u8> {
        match self {
            NativeSpeedSteps::Steps14 => Some(14),
            NativeSpeedSteps::Steps28 => Some(28),
            NativeSpeedSteps::Steps128 => Some(126),
            NativeSpeedSteps::Unknown => None,
        }
    }
}

/// Speed-step count as presented to callers.
///
/// Märklin Motorola decoders are addressed through the same wire ranges as
/// DCC but resolve fewer real steps, so the caller-facing view collapses
/// the Motorola ranges: native 14 and 28 both present 14 steps, native 128
/// presents 28.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpeedSteps {
    Steps14,
    Steps28,
    Steps128,
}

impl SpeedSteps {
    /// The normalized view of a native range under the given protocol.
    pub const fn from_native(native: NativeSpeedSteps, protocol: DecoderProtocol) -> Option<Self> {
        match (protocol, native) {
            (DecoderProtocol::Dcc, NativeSpeedSteps::Steps14) => Some(SpeedSteps::Steps14),
            (DecoderProtocol::Dcc, NativeSpeedSteps::Steps28) => Some(SpeedSteps::Steps28),
            (DecoderProtocol::Dcc, NativeSpeedSteps::Steps128) => Some(SpeedSteps::Steps128),
            (DecoderProtocol::Motorola, NativeSpeedSteps::Steps14) => Some(SpeedSteps::Steps14),
            (DecoderProtocol::Motorola, NativeSpeedSteps::Steps28) => Some(SpeedSteps::Steps14),
            (DecoderProtocol::Motorola, NativeSpeedSteps::Steps128) => Some(SpeedSteps::Steps28),
            (_, NativeSpeedSteps::Unknown) => None,
        }
    }
}

/// Map a caller speed in the normalized range onto the native range.
///
/// Motorola decoders take their speeds in the collapsed caller ranges, so
/// the value has to be widened before encoding: identity for native 14,
/// doubled for native 28, and scaled by 4.6 (rounded up) for native 128.
/// The result is clamped to the largest speed of the native range.
pub fn to_native_speed(speed: u8, native: NativeSpeedSteps, protocol: DecoderProtocol) -> u8 {
    let widened = match (protocol, native) {
        (DecoderProtocol::Motorola, NativeSpeedSteps::Steps28) => (speed as u16) * 2,
        (DecoderProtocol::Motorola, NativeSpeedSteps::Steps128) => ((speed as u16) * 46 + 9) / 10,
        _ => speed as u16,
    };
    let max = native.max_speed().unwrap_or(126) as u16;
    if widened > max {
        max as u8
    } else {
        widened as u8
    }
}

/// Wire codes for the 28-step speed range, indexed by speed value plus one.
/// Index 0 is stop and index 1 is emergency stop; the intermediate-step bit
/// of each code sits at bit 4.
const SPEED_CODES_28: [u8; 30] = [
    0x00, 0x01, 0x02, 0x12, 0x03, 0x13, 0x04, 0x14, 0x05, 0x15, 0x06, 0x16, 0x07, 0x17, 0x08,
    0x18, 0x09, 0x19, 0x0A, 0x1A, 0x0B, 0x1B, 0x0C, 0x1C, 0x0D, 0x1D, 0x0E, 0x1E, 0x0F, 0x1F,
];

/// Encode a native-range speed value into the seven speed bits of a drive
/// octet. Speed 0 encodes as stop; emergency stop is a separate command and
/// never produced here.
pub fn encode_speed(speed: u8, native: NativeSpeedSteps) -> u8 {
    if speed == 0 {
        return 0;
    }
    match native {
        NativeSpeedSteps::Steps14 => speed.min(14) + 1,
        NativeSpeedSteps::Steps28 => SPEED_CODES_28[speed.min(28) as usize + 1],
        _ => speed.min(126) + 1,
    }
}

/// Decode the seven speed bits of an info octet back into a native-range
/// speed value. Stop and emergency stop both decode to 0.
pub fn decode_speed(code: u8, native: NativeSpeedSteps) -> u8 {
    let code = code & 0x7F;
    match native {
        NativeSpeedSteps::Steps14 => match code {
            0 | 1 => 0,
            c => (c - 1).min(14),
        },
        NativeSpeedSteps::Steps28 => {
            let linear = ((code & 0x0F) << 1) | ((code >> 4) & 0x01);
            match linear {
                0..=3 => 0,
                c => c - 3,
            }
        }
        _ => match code {
            0 | 1 => 0,
            c => c - 1,
        },
    }
}

/// Decoded state of one locomotive as reported by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocoInfo {
    pub address: LocoAddress,
    /// The track protocol driving this decoder. The loco-info frame does
    /// not carry it; the station reports it through a separate loco-mode
    /// answer, so it may be absent on unsolicited updates.
    pub protocol: Option<DecoderProtocol>,
    pub steps: NativeSpeedSteps,
    /// Set while another controller holds the loco.
    pub is_busy: bool,
    pub direction: Direction,
    /// Decoded speed in the native range, 0 meaning stopped.
    pub speed: u8,
    pub is_double_traction: bool,
    pub is_smart_search: bool,
    /// Function states, bit `n` carrying F`n`.
    pub functions: u32,
}

impl LocoInfo {
    /// State of function `n`.
    pub const fn function(&self, n: u8) -> bool {
        n < 32 && self.functions & (1 << n) != 0
    }
}

/// Decoded state of one of the 120 locomotive slots held by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LocoSlotInfo {
    pub slot: u8,
    pub address: LocoAddress,
    pub protocol: DecoderProtocol,
    pub steps: NativeSpeedSteps,
    pub direction: Direction,
    /// Decoded speed in the native range, 0 meaning stopped.
    pub speed: u8,
    /// Function states, bit `n` carrying F`n`. The slot dump carries
    /// F5 through F28 only.
    pub functions: u32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn xbus_address_masks_long_addresses() {
        assert_eq!(LocoAddress::new(3).as_xbus_bytes(), [0x00, 0x03]);
        assert_eq!(LocoAddress::new(127).as_xbus_bytes(), [0x00, 0x7F]);
        assert_eq!(LocoAddress::new(128).as_xbus_bytes(), [0xC0, 0x80]);
        assert_eq!(LocoAddress::new(4097).as_xbus_bytes(), [0xD0, 0x01]);
    }

    #[test]
    fn xbus_address_ignores_format_flags() {
        assert_eq!(LocoAddress::from_xbus_bytes(0xC1, 0x00), LocoAddress::new(0x100));
        assert_eq!(LocoAddress::from_xbus_bytes(0x00, 0x03), LocoAddress::new(3));
    }

    #[test]
    fn speed_steps_from_db0() {
        assert_eq!(NativeSpeedSteps::from_db0(0x00), NativeSpeedSteps::Steps14);
        assert_eq!(NativeSpeedSteps::from_db0(0x0A), NativeSpeedSteps::Steps28);
        assert_eq!(NativeSpeedSteps::from_db0(0x04), NativeSpeedSteps::Steps128);
        assert_eq!(NativeSpeedSteps::from_db0(0x07), NativeSpeedSteps::Unknown);
    }

    #[test]
    fn motorola_ranges_collapse() {
        assert_eq!(
            SpeedSteps::from_native(NativeSpeedSteps::Steps28, DecoderProtocol::Motorola),
            Some(SpeedSteps::Steps14)
        );
        assert_eq!(
            SpeedSteps::from_native(NativeSpeedSteps::Steps128, DecoderProtocol::Motorola),
            Some(SpeedSteps::Steps28)
        );
        assert_eq!(
            SpeedSteps::from_native(NativeSpeedSteps::Steps28, DecoderProtocol::Dcc),
            Some(SpeedSteps::Steps28)
        );
    }

    #[test]
    fn motorola_speed_widening() {
        assert_eq!(
            to_native_speed(7, NativeSpeedSteps::Steps14, DecoderProtocol::Motorola),
            7
        );
        assert_eq!(
            to_native_speed(7, NativeSpeedSteps::Steps28, DecoderProtocol::Motorola),
            14
        );
        // ceil(28 * 4.6) = 129, clamped to the largest 128-range speed.
        assert_eq!(
            to_native_speed(28, NativeSpeedSteps::Steps128, DecoderProtocol::Motorola),
            126
        );
        assert_eq!(
            to_native_speed(10, NativeSpeedSteps::Steps128, DecoderProtocol::Motorola),
            46
        );
    }

    #[test]
    fn speed_codes_round_trip() {
        for s in 0..=14 {
            let code = encode_speed(s, NativeSpeedSteps::Steps14);
            assert_eq!(decode_speed(code, NativeSpeedSteps::Steps14), s);
        }
        for s in 0..=28 {
            let code = encode_speed(s, NativeSpeedSteps::Steps28);
            assert_eq!(decode_speed(code, NativeSpeedSteps::Steps28), s);
        }
        for s in 0..=126 {
            let code = encode_speed(s, NativeSpeedSteps::Steps128);
            assert_eq!(decode_speed(code, NativeSpeedSteps::Steps128), s);
        }
    }

    #[test]
    fn intermediate_step_bit_sits_at_bit_four() {
        assert_eq!(encode_speed(1, NativeSpeedSteps::Steps28), 0x02);
        assert_eq!(encode_speed(2, NativeSpeedSteps::Steps28), 0x12);
        assert_eq!(encode_speed(28, NativeSpeedSteps::Steps28), 0x1F);
    }

    #[test]
    fn emergency_stop_codes_decode_to_zero() {
        assert_eq!(decode_speed(0x01, NativeSpeedSteps::Steps14), 0);
        assert_eq!(decode_speed(0x01, NativeSpeedSteps::Steps128), 0);
        assert_eq!(decode_speed(0x10, NativeSpeedSteps::Steps28), 0);
    }
}
