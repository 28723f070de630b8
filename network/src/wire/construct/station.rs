use z21_core::bcast::BroadcastFlags;

use super::super::{headers, xheaders, FrameBuffer};

/// Request the serial number of the station.
pub fn get_serial_number() -> FrameBuffer {
    super::new(headers::GET_SERIAL_NUMBER, &[])
}

/// Request the feature-lock code of the station.
pub fn get_code() -> FrameBuffer {
    super::new(headers::GET_CODE, &[])
}

/// Request hardware variant and firmware version.
///
/// Supported from firmware 1.10 on; also the probe used for subnet
/// discovery, where it is broadcast instead of sent to a peer.
pub fn get_hardware_info() -> FrameBuffer {
    super::new(headers::GET_HWINFO, &[])
}

/// Request the firmware version through the X-Bus envelope.
///
/// Predates [`get_hardware_info`] and works on every firmware.
pub fn get_firmware_version() -> FrameBuffer {
    super::xbus(&[xheaders::GET_FIRMWARE_VERSION, 0x0A])
}

/// Log this client off from the station.
///
/// The station drops the client from its table; no answer is sent.
pub fn logoff() -> FrameBuffer {
    super::new(headers::LOGOFF, &[])
}

/// Publish the broadcast subscription mask for this client.
pub fn set_broadcast_flags(flags: BroadcastFlags) -> FrameBuffer {
    super::new(headers::SET_BROADCASTFLAGS, &flags.bits().to_le_bytes())
}

/// Request the broadcast subscription mask the station holds for this
/// client.
pub fn get_broadcast_flags() -> FrameBuffer {
    super::new(headers::GET_BROADCASTFLAGS, &[])
}

/// Request a system-state report.
///
/// Answered unconditionally, independent of the system-state broadcast
/// flag. Doubles as keep-alive traffic.
pub fn get_system_state() -> FrameBuffer {
    super::new(headers::SYSTEMSTATE_GETDATA, &[])
}
