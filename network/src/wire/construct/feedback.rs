use z21_core::loco::LocoAddress;

use super::super::{headers, FrameBuffer};

/// Request the current occupancy state of one R-Bus feedback group.
pub fn rbus_get_data(group: u8) -> FrameBuffer {
    super::new(headers::RBUS_GETDATA, &[group])
}

/// Request the RailCom data of one locomotive.
pub fn railcom_get_data(address: LocoAddress) -> FrameBuffer {
    let addr = address.value().to_le_bytes();
    super::new(headers::RAILCOM_GETDATA, &[0x01, addr[0], addr[1]])
}

/// Request the RailCom data of the next locomotive in the station's
/// round-robin. Address zero selects the rotation.
pub fn railcom_get_data_next() -> FrameBuffer {
    railcom_get_data(LocoAddress::new(0))
}
