use z21_core::loco::{encode_speed, DecoderProtocol, Direction, LocoAddress, NativeSpeedSteps};

use super::super::{headers, xheaders, FrameBuffer};

/// Request the drive state of a locomotive.
///
/// The station also registers this client as a subscriber for follow-up
/// info broadcasts of that locomotive.
pub fn get_loco_info(address: LocoAddress) -> FrameBuffer {
    let addr = address.as_xbus_bytes();
    super::xbus(&[xheaders::GET_LOCO_INFO, 0xF0, addr[0], addr[1]])
}

/// Request the track protocol a locomotive address is driven with.
pub fn get_loco_mode(address: LocoAddress) -> FrameBuffer {
    super::new(headers::GET_LOCOMODE, &address.as_raw_bytes())
}

/// Select the track protocol for a locomotive address.
///
/// The station persists the choice; addresses above 255 always run DCC.
pub fn set_loco_mode(address: LocoAddress, protocol: DecoderProtocol) -> FrameBuffer {
    let addr = address.as_raw_bytes();
    super::new(headers::SET_LOCOMODE, &[addr[0], addr[1], protocol.into()])
}

/// Drive a locomotive.
///
/// `speed` is a native-range speed value, 0 meaning stop.
///
/// # Panics
/// The function panics if `steps` is [`NativeSpeedSteps::Unknown`].
pub fn set_loco_drive(
    address: LocoAddress,
    speed: u8,
    steps: NativeSpeedSteps,
    direction: Direction,
) -> FrameBuffer {
    let db0 = match steps.drive_db0() {
        Some(db0) => db0,
        None => panic!("cannot drive an unknown speed-step range"),
    };
    let addr = address.as_xbus_bytes();
    let speed = encode_speed(speed, steps) | (direction.bit() << 7);
    super::xbus(&[xheaders::SET_LOCO, db0, addr[0], addr[1], speed])
}

/// Toggle a locomotive function. The function index is truncated to the
/// six bits the command carries.
pub fn set_loco_function(address: LocoAddress, index: u8) -> FrameBuffer {
    let addr = address.as_xbus_bytes();
    // Switch type 0b10: toggle.
    super::xbus(&[
        xheaders::SET_LOCO,
        0xF8,
        addr[0],
        addr[1],
        0x80 | (index & 0x3F),
    ])
}

/// Request the dump of one of the 120 locomotive slots of the station.
///
/// Not part of the published protocol; observed against firmware 1.43.
pub fn get_loco_slot_info(slot: u8) -> FrameBuffer {
    super::new(headers::LOCO_SLOT_INFO, &[slot])
}
