use z21_core::loco::DecoderProtocol;
use z21_core::turnout::TurnoutAddress;

use super::super::{headers, xheaders, FrameBuffer};

/// Request the position of a turnout.
pub fn get_turnout_info(address: TurnoutAddress) -> FrameBuffer {
    let addr = address.as_bytes();
    super::xbus(&[xheaders::TURNOUT_INFO, addr[0], addr[1]])
}

/// Energize or release one turnout output.
///
/// `output` selects the coil (0 or 1); switching a turnout takes an
/// activate pulse followed by a release pulse on the same output.
pub fn set_turnout(address: TurnoutAddress, output: u8, activate: bool) -> FrameBuffer {
    let addr = address.as_bytes();
    let mut db2 = 0x80 | (output & 0x01);
    if activate {
        db2 |= 0x08;
    }
    super::xbus(&[xheaders::SET_TURNOUT, addr[0], addr[1], db2])
}

/// Request the track protocol a turnout address is driven with.
pub fn get_turnout_mode(address: TurnoutAddress) -> FrameBuffer {
    super::new(headers::GET_TURNOUTMODE, &address.as_bytes())
}

/// Select the track protocol for a turnout address.
pub fn set_turnout_mode(address: TurnoutAddress, protocol: DecoderProtocol) -> FrameBuffer {
    let addr = address.as_bytes();
    super::new(headers::SET_TURNOUTMODE, &[addr[0], addr[1], protocol.into()])
}
