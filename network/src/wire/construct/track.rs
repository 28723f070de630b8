use super::super::{xheaders, FrameBuffer};

/// Switch the track voltage on, ending an emergency stop or programming
/// mode. The station answers with a track-power broadcast.
pub fn set_track_power_on() -> FrameBuffer {
    super::xbus(&[xheaders::GET_STATE, 0x81])
}

/// Switch the track voltage off. Equivalent to the STOP button on the
/// station.
pub fn set_track_power_off() -> FrameBuffer {
    super::xbus(&[xheaders::GET_STATE, 0x80])
}

/// Stop every locomotive while keeping the track powered.
pub fn set_emergency_stop() -> FrameBuffer {
    super::xbus(&[xheaders::SET_STOP])
}

/// Request the central state of the station.
pub fn get_status() -> FrameBuffer {
    super::xbus(&[xheaders::GET_STATE, 0x24])
}
