//! Outbound command builders.
//!
//! Each command is a pure function from typed arguments to a complete
//! frame: length word first, then the header, the command octets and,
//! for X-Bus commands, the trailing XOR checksum.

use super::{headers, Frame, FrameBuffer, HEADER_LEN};

pub mod accessory;
pub mod feedback;
pub mod loco;
pub mod station;
pub mod track;

fn new(header: u16, data: &[u8]) -> FrameBuffer {
    let total = HEADER_LEN + data.len();
    debug_assert!(total <= super::MAX_FRAME_LEN);

    let mut buffer = FrameBuffer::new();
    buffer.resize(total, 0).unwrap();

    let mut frame = Frame::new_unchecked(&mut buffer[..]);
    frame.set_total_len(total as u16);
    frame.set_header(header);
    frame.payload_mut().copy_from_slice(data);
    buffer
}

/// Build an X-Bus frame from the X-header and data octets; the checksum
/// octet is appended.
fn xbus(data: &[u8]) -> FrameBuffer {
    let total = HEADER_LEN + data.len() + 1;
    debug_assert!(total <= super::MAX_FRAME_LEN);

    let mut buffer = FrameBuffer::new();
    buffer.resize(total, 0).unwrap();

    let mut frame = Frame::new_unchecked(&mut buffer[..]);
    frame.set_total_len(total as u16);
    frame.set_header(headers::XBUS);
    frame.payload_mut()[..data.len()].copy_from_slice(data);
    frame.fill_checksum();
    buffer
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{DecodeContext, Message};
    use z21_core::bcast::BroadcastFlags;
    use z21_core::loco::{Direction, LocoAddress, NativeSpeedSteps};
    use z21_core::turnout::TurnoutAddress;

    #[test]
    fn serial_number_request_bytes() {
        assert_eq!(station::get_serial_number().as_slice(), &[0x04, 0x00, 0x10, 0x00]);
    }

    #[test]
    fn every_builder_is_self_consistent() {
        let frames = [
            station::get_serial_number(),
            station::get_code(),
            station::get_hardware_info(),
            station::get_firmware_version(),
            station::get_broadcast_flags(),
            station::set_broadcast_flags(
                BroadcastFlags::DRIVING_SWITCHING | BroadcastFlags::SYSTEM_STATE,
            ),
            station::get_system_state(),
            station::logoff(),
            track::set_track_power_on(),
            track::set_track_power_off(),
            track::set_emergency_stop(),
            track::get_status(),
            loco::get_loco_info(LocoAddress::new(1203)),
            loco::get_loco_mode(LocoAddress::new(1203)),
            loco::set_loco_mode(LocoAddress::new(3), z21_core::loco::DecoderProtocol::Dcc),
            loco::set_loco_drive(
                LocoAddress::new(3),
                10,
                NativeSpeedSteps::Steps128,
                Direction::Forward,
            ),
            loco::set_loco_function(LocoAddress::new(3), 5),
            loco::get_loco_slot_info(7),
            accessory::get_turnout_info(TurnoutAddress::new(5)),
            accessory::set_turnout(TurnoutAddress::new(5), 1, true),
            accessory::get_turnout_mode(TurnoutAddress::new(5)),
            accessory::set_turnout_mode(
                TurnoutAddress::new(5),
                z21_core::loco::DecoderProtocol::Motorola,
            ),
            feedback::rbus_get_data(0),
            feedback::railcom_get_data(LocoAddress::new(42)),
            feedback::railcom_get_data_next(),
        ];

        for raw in frames.iter() {
            let frame = Frame::new_checked(&raw[..]).unwrap();
            assert_eq!(frame.total_len() as usize, raw.len());
            if frame.is_xbus() {
                assert!(frame.verify_checksum(), "bad checksum in {raw:02X?}");
            }
        }
    }

    #[test]
    fn broadcast_flag_mask_travels_little_endian() {
        let raw = station::set_broadcast_flags(
            BroadcastFlags::DRIVING_SWITCHING | BroadcastFlags::SYSTEM_STATE,
        );
        assert_eq!(raw.as_slice(), &[0x08, 0x00, 0x50, 0x00, 0x01, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn drive_command_encodes_step_range_and_direction() {
        let raw = loco::set_loco_drive(
            LocoAddress::new(3),
            10,
            NativeSpeedSteps::Steps128,
            Direction::Forward,
        );
        assert_eq!(
            raw.as_slice(),
            &[0x0A, 0x00, 0x40, 0x00, 0xE4, 0x13, 0x00, 0x03, 0x8B, 0x7F]
        );
    }

    #[test]
    fn long_addresses_are_masked_on_xbus_commands() {
        let raw = loco::get_loco_info(LocoAddress::new(1203));
        assert_eq!(raw.as_slice(), &[0x09, 0x00, 0x40, 0x00, 0xE3, 0xF0, 0xC4, 0xB3, 0x64]);

        // The loco-mode request takes the same address unmasked.
        let raw = loco::get_loco_mode(LocoAddress::new(1203));
        assert_eq!(raw.as_slice(), &[0x06, 0x00, 0x60, 0x00, 0x04, 0xB3]);
    }

    #[test]
    fn function_toggle_command() {
        let raw = loco::set_loco_function(LocoAddress::new(3), 5);
        assert_eq!(
            raw.as_slice(),
            &[0x0A, 0x00, 0x40, 0x00, 0xE4, 0xF8, 0x00, 0x03, 0x85, 0x9A]
        );
    }

    #[test]
    fn turnout_pulses() {
        let on = accessory::set_turnout(TurnoutAddress::new(5), 1, true);
        assert_eq!(on.as_slice(), &[0x09, 0x00, 0x40, 0x00, 0x53, 0x00, 0x05, 0x89, 0xDF]);

        let off = accessory::set_turnout(TurnoutAddress::new(5), 1, false);
        assert_eq!(off.as_slice(), &[0x09, 0x00, 0x40, 0x00, 0x53, 0x00, 0x05, 0x81, 0xD7]);
    }

    #[test]
    fn emergency_stop_round_trips() {
        let raw = track::set_emergency_stop();
        assert_eq!(raw.as_slice(), &[0x06, 0x00, 0x40, 0x00, 0x80, 0x80]);
    }

    #[test]
    fn info_requests_parse_back_as_answers() {
        // The turnout-info request and answer share an X-header; the
        // parser must accept the longer answer layout only.
        let raw = feedback::railcom_get_data(LocoAddress::new(42));
        assert_eq!(raw.as_slice(), &[0x07, 0x00, 0x89, 0x00, 0x01, 0x2A, 0x00]);

        let power = track::set_track_power_on();
        let frame = Frame::new_checked(&power[..]).unwrap();
        assert!(Message::parse(&frame, &DecodeContext::default()).is_err());
    }
}
