use z21_core::bcast::BroadcastFlags;
use z21_core::feedback::{RBusData, RailComData};
use z21_core::loco::{DecoderProtocol, LocoAddress, LocoInfo, LocoSlotInfo};
use z21_core::station::{
    CentralState, FirmwareVersion, HardwareInfo, SystemState, TrackPower, Z21Code,
};
use z21_core::turnout::{TurnoutAddress, TurnoutPosition};

/// Connection lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Disconnected,
    /// The connect handshake is running.
    Connecting,
    /// The handshake completed; commands are accepted.
    Ready,
    /// The watchdog gave up on the station.
    Lost,
}

/// A typed notification, dequeued with
/// [`Client::next_event`](super::Client::next_event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    BroadcastFlags(BroadcastFlags),
    CentralState(CentralState),
    ConnectionState(SessionState),
    EmergencyStop,
    FirmwareVersion(FirmwareVersion),
    HardwareInfo(HardwareInfo),
    LocoInfo(LocoInfo),
    LocoMode {
        address: LocoAddress,
        protocol: DecoderProtocol,
    },
    LocoSlotInfo(LocoSlotInfo),
    RBusData(RBusData),
    RailComData(RailComData),
    SerialNumber(u32),
    SystemState(SystemState),
    TrackPower(TrackPower),
    TurnoutInfo {
        address: TurnoutAddress,
        position: TurnoutPosition,
    },
    TurnoutMode {
        address: TurnoutAddress,
        protocol: DecoderProtocol,
    },
    Z21Code(Z21Code),
}

/// Count of [`EventCategory`] variants.
pub(crate) const CATEGORY_COUNT: usize = 13;

/// Broadcast-driven message categories a caller can subscribe to.
///
/// Most categories gate a broadcast flag: the station only pushes their
/// messages once the flag is part of the published mask. The LocoNet
/// categories exist for mask completeness; their message families are
/// not decoded by this library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventCategory {
    /// Driving and switching: loco info, turnout info, track power,
    /// emergency stop.
    Basic,
    RBus,
    /// RailCom reports for subscribed locomotives.
    RailComSubscribed,
    FastClock,
    SystemState,
    /// Loco info for every address. Firmware 1.20 and later.
    AllLocoInfo,
    CanDetector,
    CanBooster,
    /// RailCom reports for every locomotive.
    AllRailCom,
    LocoNet,
    LocoNetLoco,
    LocoNetTurnout,
    LocoNetDetector,
}

impl EventCategory {
    pub(crate) const ALL: [EventCategory; CATEGORY_COUNT] = [
        EventCategory::Basic,
        EventCategory::RBus,
        EventCategory::RailComSubscribed,
        EventCategory::FastClock,
        EventCategory::SystemState,
        EventCategory::AllLocoInfo,
        EventCategory::CanDetector,
        EventCategory::CanBooster,
        EventCategory::AllRailCom,
        EventCategory::LocoNet,
        EventCategory::LocoNetLoco,
        EventCategory::LocoNetTurnout,
        EventCategory::LocoNetDetector,
    ];

    pub(crate) const fn index(&self) -> usize {
        *self as usize
    }

    /// The broadcast flag bits this category requires.
    pub const fn broadcast_flags(&self) -> BroadcastFlags {
        match self {
            EventCategory::Basic => BroadcastFlags::DRIVING_SWITCHING,
            EventCategory::RBus => BroadcastFlags::RBUS,
            EventCategory::RailComSubscribed => BroadcastFlags::RAILCOM_SUBSCRIBED,
            EventCategory::FastClock => BroadcastFlags::FAST_CLOCK,
            EventCategory::SystemState => BroadcastFlags::SYSTEM_STATE,
            EventCategory::AllLocoInfo => BroadcastFlags::ALL_LOCO_INFO,
            EventCategory::CanDetector => BroadcastFlags::CAN_DETECTOR,
            EventCategory::CanBooster => BroadcastFlags::CAN_BOOSTER,
            EventCategory::AllRailCom => BroadcastFlags::RAILCOM_ALL,
            EventCategory::LocoNet => BroadcastFlags::LOCONET,
            EventCategory::LocoNetLoco => BroadcastFlags::LOCONET_LOCO,
            EventCategory::LocoNetTurnout => BroadcastFlags::LOCONET_TURNOUT,
            EventCategory::LocoNetDetector => BroadcastFlags::LOCONET_DETECTOR,
        }
    }

    /// The oldest firmware whose stations serve this category.
    pub const fn required_firmware(&self) -> Option<FirmwareVersion> {
        match self {
            EventCategory::AllLocoInfo => Some(FirmwareVersion::V1_20),
            _ => None,
        }
    }

    /// Whether a station with the given firmware serves this category.
    pub(crate) fn guard(&self, firmware: Option<FirmwareVersion>) -> bool {
        match self.required_firmware() {
            None => true,
            Some(min) => firmware.map_or(false, |fw| fw >= min),
        }
    }

    /// Whether listeners of this category keep the RailCom poller
    /// running.
    pub(crate) const fn is_railcom(&self) -> bool {
        matches!(
            self,
            EventCategory::RailComSubscribed | EventCategory::AllRailCom
        )
    }
}
