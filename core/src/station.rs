use core::fmt;

use bitflags::bitflags;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

/// Hardware variant of a command station, as reported by the
/// hardware-info answer.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum HardwareType {
    #[num_enum(default)]
    Unknown = 0x0000_0000,
    /// Black Z21, hardware variants up to 2012.
    Z21Old = 0x0000_0200,
    /// Black Z21, hardware variants from 2013.
    Z21New = 0x0000_0201,
    SmartRail = 0x0000_0202,
    /// White z21 of the starter sets.
    Z21Small = 0x0000_0203,
    /// z21start of the starter sets.
    Z21Start = 0x0000_0204,
    SingleBooster = 0x0000_0205,
    DualBooster = 0x0000_0206,
    Z21Xl = 0x0000_0211,
    XlBooster = 0x0000_0212,
    SwitchDecoder = 0x0000_0301,
    SignalDecoder = 0x0000_0302,
}

impl HardwareType {
    /// Whether this variant lacks the programming track output.
    ///
    /// Entry-level stations report a meaningless programming current;
    /// system-state decoding zeroes the reading for them.
    pub const fn is_entry_level(&self) -> bool {
        matches!(self, HardwareType::Z21Small | HardwareType::Z21Start)
    }
}

/// A station firmware version.
///
/// Firmware versions travel as binary-coded decimals; `1.43` is the
/// octet pair `0x01`, `0x43`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// First version reporting every-loco broadcasts.
    pub const V1_20: Self = Self::new(1, 20);
    /// First version carrying the capability octet in system state.
    pub const V1_42: Self = Self::new(1, 42);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Decode the packed version word of a hardware-info answer.
    pub const fn from_bcd(value: u32) -> Self {
        Self {
            major: Self::bcd(((value >> 8) & 0xFF) as u8),
            minor: Self::bcd((value & 0xFF) as u8),
        }
    }

    /// Decode a version from its major and minor BCD octets.
    pub const fn from_bcd_bytes(major: u8, minor: u8) -> Self {
        Self {
            major: Self::bcd(major),
            minor: Self::bcd(minor),
        }
    }

    const fn bcd(octet: u8) -> u8 {
        (octet >> 4) * 10 + (octet & 0x0F)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:02}", self.major, self.minor)
    }
}

/// Hardware variant and firmware version of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HardwareInfo {
    pub hardware_type: HardwareType,
    pub firmware: FirmwareVersion,
}

bitflags! {
    /// Feature set of a station, reported in the system-state capability
    /// octet by firmware 1.42 and later.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct Capabilities: u8 {
        const DCC = 0x01;
        const MM = 0x02;
        const RAILCOM = 0x08;
        const LOCO_COMMANDS = 0x10;
        const ACCESSORY_COMMANDS = 0x20;
        const DETECTOR_COMMANDS = 0x40;
        const NEEDS_UNLOCK_CODE = 0x80;
    }
}

/// Feature-lock state of an entry-level station.
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Z21Code {
    /// All features permanently unlocked.
    NoLock = 0x00,
    /// z21start with driving and switching locked.
    StartLocked = 0x01,
    /// z21start unlocked by code.
    StartUnlocked = 0x02,
    #[num_enum(default)]
    Unknown = 0xFF,
}

bitflags! {
    /// Global station condition bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CentralState: u8 {
        const EMERGENCY_STOP = 0x01;
        const TRACK_VOLTAGE_OFF = 0x02;
        const SHORT_CIRCUIT = 0x04;
        const PROGRAMMING_MODE = 0x20;
    }
}

bitflags! {
    /// Extended station condition bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CentralStateEx: u8 {
        const HIGH_TEMPERATURE = 0x01;
        const POWER_LOST = 0x02;
        const SHORT_CIRCUIT_EXTERNAL = 0x04;
        const SHORT_CIRCUIT_INTERNAL = 0x08;
        const RCN_213 = 0x20;
    }
}

/// Track output state, as reported by the track-power broadcast.
#[derive(TryFromPrimitive, IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TrackPower {
    Off = 0x00,
    On = 0x01,
    Programming = 0x02,
    ShortCircuit = 0x08,
}

/// Periodic electrical and thermal readings of the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SystemState {
    /// Main track current in mA.
    pub main_current: i16,
    /// Programming track current in mA. Zeroed on entry-level hardware.
    pub prog_current: i16,
    /// Smoothed main track current in mA.
    pub filtered_main_current: i16,
    /// Internal temperature in °C.
    pub temperature: i16,
    /// Supply voltage in mV.
    pub supply_voltage: i16,
    /// Internal track voltage in mV.
    pub vcc_voltage: i16,
    pub central_state: CentralState,
    pub central_state_ex: CentralStateEx,
    /// Present from firmware 1.42 on.
    pub capabilities: Option<Capabilities>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn firmware_versions_decode_from_bcd() {
        assert_eq!(FirmwareVersion::from_bcd(0x0000_0142), FirmwareVersion::new(1, 42));
        assert_eq!(FirmwareVersion::from_bcd(0x0000_0130), FirmwareVersion::new(1, 30));
        assert_eq!(FirmwareVersion::from_bcd_bytes(0x01, 0x43), FirmwareVersion::new(1, 43));
    }

    #[test]
    fn firmware_versions_order_numerically() {
        assert!(FirmwareVersion::new(1, 42) > FirmwareVersion::new(1, 20));
        assert!(FirmwareVersion::new(1, 43) >= FirmwareVersion::V1_42);
        assert!(FirmwareVersion::new(1, 19) < FirmwareVersion::V1_20);
    }

    #[test]
    fn hardware_types_decode_with_fallback() {
        assert_eq!(HardwareType::from(0x0000_0201), HardwareType::Z21New);
        assert_eq!(HardwareType::from(0x0000_0211), HardwareType::Z21Xl);
        assert_eq!(HardwareType::from(0xDEAD_BEEF), HardwareType::Unknown);
    }

    #[test]
    fn entry_level_hardware() {
        assert!(HardwareType::Z21Start.is_entry_level());
        assert!(HardwareType::Z21Small.is_entry_level());
        assert!(!HardwareType::Z21New.is_entry_level());
    }

    #[test]
    fn firmware_renders_two_digit_minor() {
        assert_eq!(FirmwareVersion::new(1, 5).to_string(), "1.05");
        assert_eq!(FirmwareVersion::new(1, 43).to_string(), "1.43");
    }
}
