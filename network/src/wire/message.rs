use byteorder::{ByteOrder, LittleEndian};

use z21_core::bcast::BroadcastFlags;
use z21_core::feedback::{RBusData, RailComData, RBUS_GROUP_COUNT};
use z21_core::loco::{
    decode_speed, DecoderProtocol, Direction, LocoAddress, LocoInfo, LocoSlotInfo,
    NativeSpeedSteps,
};
use z21_core::station::{
    Capabilities, CentralState, CentralStateEx, FirmwareVersion, HardwareInfo, HardwareType,
    SystemState, TrackPower, Z21Code,
};
use z21_core::turnout::{TurnoutAddress, TurnoutPosition};

use super::{headers, xheaders, Error, Frame, Result};

/// Station knowledge that shapes decoding.
///
/// Two answers change layout with the peer: the system-state capability
/// octet exists from firmware 1.42 on, and entry-level hardware reports a
/// meaningless programming current.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecodeContext {
    pub firmware: Option<FirmwareVersion>,
    pub hardware: Option<HardwareType>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message {
    SerialNumber(u32),
    Code(Z21Code),
    HardwareInfo(HardwareInfo),
    BroadcastFlags(BroadcastFlags),
    LocoMode {
        address: LocoAddress,
        protocol: DecoderProtocol,
    },
    TurnoutMode {
        address: TurnoutAddress,
        protocol: DecoderProtocol,
    },
    RBusData(RBusData),
    SystemState(SystemState),
    RailComData(RailComData),
    LocoSlotInfo(LocoSlotInfo),
    TrackPower(TrackPower),
    StatusChanged(CentralState),
    EmergencyStop,
    FirmwareVersion(FirmwareVersion),
    TurnoutInfo {
        address: TurnoutAddress,
        position: TurnoutPosition,
    },
    LocoInfo(LocoInfo),
    /// The station rejected the previous command.
    UnknownCommand,
}

impl Message {
    /// Decode one frame. The frame must already have passed
    /// [`Frame::check_len`]; X-Bus checksums are verified here.
    pub fn parse(frame: &Frame<&[u8]>, ctx: &DecodeContext) -> Result<Message> {
        match frame.header() {
            headers::GET_SERIAL_NUMBER => {
                need(frame, 8)?;
                Ok(Message::SerialNumber(LittleEndian::read_u32(
                    &frame.payload()[..4],
                )))
            }
            headers::GET_CODE => {
                need(frame, 5)?;
                Ok(Message::Code(Z21Code::from(frame.payload()[0])))
            }
            headers::GET_HWINFO => {
                need(frame, 12)?;
                let payload = frame.payload();
                Ok(Message::HardwareInfo(HardwareInfo {
                    hardware_type: HardwareType::from(LittleEndian::read_u32(&payload[..4])),
                    firmware: FirmwareVersion::from_bcd(LittleEndian::read_u32(&payload[4..8])),
                }))
            }
            headers::GET_BROADCASTFLAGS => {
                need(frame, 8)?;
                Ok(Message::BroadcastFlags(BroadcastFlags::from_bits_truncate(
                    LittleEndian::read_u32(&frame.payload()[..4]),
                )))
            }
            headers::GET_LOCOMODE => {
                need(frame, 7)?;
                let payload = frame.payload();
                Ok(Message::LocoMode {
                    address: LocoAddress::new(((payload[0] as u16) << 8) | payload[1] as u16),
                    protocol: DecoderProtocol::try_from(payload[2])
                        .map_err(|_| Error::Malformed)?,
                })
            }
            headers::GET_TURNOUTMODE => {
                need(frame, 7)?;
                let payload = frame.payload();
                Ok(Message::TurnoutMode {
                    address: TurnoutAddress::from_bytes(payload[0], payload[1]),
                    protocol: DecoderProtocol::try_from(payload[2])
                        .map_err(|_| Error::Malformed)?,
                })
            }
            headers::RBUS_DATACHANGED => {
                need(frame, 15)?;
                let payload = frame.payload();
                if payload[0] >= RBUS_GROUP_COUNT {
                    return Err(Error::Malformed);
                }
                Ok(Message::RBusData(RBusData::from_bytes(
                    payload[0],
                    &payload[1..11],
                )))
            }
            headers::SYSTEMSTATE_DATACHANGED => {
                need(frame, 20)?;
                Ok(Message::SystemState(parse_system_state(
                    frame.payload(),
                    ctx,
                )))
            }
            headers::RAILCOM_DATACHANGED => {
                need(frame, 15)?;
                let payload = frame.payload();
                Ok(Message::RailComData(RailComData {
                    address: LocoAddress::new(LittleEndian::read_u16(&payload[..2])),
                    receive_counter: LittleEndian::read_u32(&payload[2..6]),
                    error_counter: LittleEndian::read_u16(&payload[6..8]),
                    options: payload[8],
                    speed: payload[9],
                    qos: payload[10],
                }))
            }
            headers::LOCO_SLOT_INFO => {
                need(frame, 24)?;
                parse_loco_slot(frame.payload())
            }
            headers::XBUS => {
                if !frame.verify_checksum() {
                    return Err(Error::Checksum);
                }
                parse_xbus(frame, ctx)
            }
            _ => Err(Error::Unrecognized),
        }
    }
}

fn need<T: AsRef<[u8]>>(frame: &Frame<T>, min_total: u16) -> Result<()> {
    if frame.total_len() < min_total {
        Err(Error::Malformed)
    } else {
        Ok(())
    }
}

fn parse_xbus(frame: &Frame<&[u8]>, ctx: &DecodeContext) -> Result<Message> {
    match frame.x_header() {
        xheaders::BC_TRACK_POWER => {
            need(frame, 7)?;
            match frame.payload()[1] {
                0x82 => Ok(Message::UnknownCommand),
                state => TrackPower::try_from(state)
                    .map(Message::TrackPower)
                    .map_err(|_| Error::Unrecognized),
            }
        }
        xheaders::STATUS_CHANGED => {
            need(frame, 8)?;
            Ok(Message::StatusChanged(CentralState::from_bits_truncate(
                frame.payload()[2],
            )))
        }
        xheaders::BC_STOPPED => {
            need(frame, 6)?;
            Ok(Message::EmergencyStop)
        }
        xheaders::FIRMWARE_VERSION => {
            need(frame, 9)?;
            let payload = frame.payload();
            if payload[1] != 0x0A {
                return Err(Error::Malformed);
            }
            Ok(Message::FirmwareVersion(FirmwareVersion::from_bcd_bytes(
                payload[2], payload[3],
            )))
        }
        xheaders::TURNOUT_INFO => {
            need(frame, 9)?;
            let payload = frame.payload();
            Ok(Message::TurnoutInfo {
                address: TurnoutAddress::from_bytes(payload[1], payload[2]),
                position: TurnoutPosition::from(payload[3] & 0x03),
            })
        }
        xheaders::LOCO_INFO => {
            need(frame, 14)?;
            Ok(Message::LocoInfo(parse_loco_info(frame.payload())))
        }
        _ => Err(Error::Unrecognized),
    }
}

fn parse_loco_info(payload: &[u8]) -> LocoInfo {
    let steps = NativeSpeedSteps::from_db0(payload[3]);
    let db3 = payload[4];
    let db4 = payload[5];

    let mut functions = ((db4 >> 4) & 0x01) as u32; // F0
    functions |= ((db4 & 0x0F) as u32) << 1; // F1..F4
    functions |= (payload[6] as u32) << 5; // F5..F12
    functions |= (payload[7] as u32) << 13; // F13..F20
    functions |= (payload[8] as u32) << 21; // F21..F28
    if payload.len() >= 11 {
        functions |= ((payload[9] & 0x07) as u32) << 29; // F29..F31
    }

    LocoInfo {
        address: LocoAddress::from_xbus_bytes(payload[1], payload[2]),
        protocol: None,
        steps,
        is_busy: payload[3] & 0x08 != 0,
        direction: Direction::from_bit(db3 & 0x80 != 0),
        speed: decode_speed(db3 & 0x7F, steps),
        is_double_traction: db4 & 0x40 != 0,
        is_smart_search: db4 & 0x20 != 0,
        functions,
    }
}

fn parse_system_state(payload: &[u8], ctx: &DecodeContext) -> SystemState {
    let entry_level = ctx
        .hardware
        .map(|hw| hw.is_entry_level())
        .unwrap_or(false);
    let capabilities = match ctx.firmware {
        Some(fw) if fw >= FirmwareVersion::V1_42 => {
            Some(Capabilities::from_bits_truncate(payload[15]))
        }
        _ => None,
    };

    SystemState {
        main_current: LittleEndian::read_i16(&payload[..2]),
        prog_current: if entry_level {
            0
        } else {
            LittleEndian::read_i16(&payload[2..4])
        },
        filtered_main_current: LittleEndian::read_i16(&payload[4..6]),
        temperature: LittleEndian::read_i16(&payload[6..8]),
        supply_voltage: LittleEndian::read_i16(&payload[8..10]),
        vcc_voltage: LittleEndian::read_i16(&payload[10..12]),
        central_state: CentralState::from_bits_truncate(payload[12]),
        central_state_ex: CentralStateEx::from_bits_truncate(payload[13]),
        capabilities,
    }
}

/// Map the mode octet of a slot dump onto protocol and step range.
///
/// The slot dump is not part of the published protocol; these codes were
/// observed against firmware 1.43.
fn slot_mode(code: u8) -> Option<(DecoderProtocol, NativeSpeedSteps)> {
    match code {
        3 => Some((DecoderProtocol::Dcc, NativeSpeedSteps::Steps14)),
        6 => Some((DecoderProtocol::Dcc, NativeSpeedSteps::Steps28)),
        9 => Some((DecoderProtocol::Dcc, NativeSpeedSteps::Steps128)),
        67 => Some((DecoderProtocol::Motorola, NativeSpeedSteps::Steps14)),
        83 => Some((DecoderProtocol::Motorola, NativeSpeedSteps::Steps28)),
        117 => Some((DecoderProtocol::Motorola, NativeSpeedSteps::Steps128)),
        _ => None,
    }
}

fn parse_loco_slot(payload: &[u8]) -> Result<Message> {
    let (protocol, steps) = slot_mode(payload[14]).ok_or(Error::Malformed)?;

    // F12, F20 and F28 overflow into the octet holding the lower numbers.
    let mut f5_12 = payload[11];
    let mut f13_20 = payload[12];
    let mut f21_28 = payload[13];
    if payload[9] & 0x10 != 0 {
        f5_12 |= 0x80;
    }
    if payload[9] & 0x20 != 0 {
        f13_20 |= 0x80;
    }
    if payload[9] & 0x40 != 0 {
        f21_28 |= 0x80;
    }
    let functions =
        ((f5_12 as u32) << 5) | ((f13_20 as u32) << 13) | ((f21_28 as u32) << 21);

    Ok(Message::LocoSlotInfo(LocoSlotInfo {
        slot: payload[3],
        address: LocoAddress::new(LittleEndian::read_u16(&payload[5..7])),
        protocol,
        steps,
        direction: Direction::from_bit(payload[10] & 0x20 == 0),
        speed: decode_speed(payload[8] & 0x7F, steps),
        functions,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Datagrams;

    fn parse(raw: &[u8]) -> Result<Message> {
        let frame = Frame::new_checked(raw)?;
        Message::parse(&frame, &DecodeContext::default())
    }

    fn parse_with(raw: &[u8], ctx: &DecodeContext) -> Result<Message> {
        let frame = Frame::new_checked(raw)?;
        Message::parse(&frame, ctx)
    }

    #[test]
    fn serial_number_answer() {
        let msg = parse(&[0x08, 0x00, 0x10, 0x00, 0x40, 0xE2, 0x01, 0x00]).unwrap();
        assert_eq!(msg, Message::SerialNumber(123_456));
    }

    #[test]
    fn track_power_off_broadcast() {
        let msg = parse(&[0x07, 0x00, 0x40, 0x00, 0x61, 0x00, 0x61]).unwrap();
        assert_eq!(msg, Message::TrackPower(TrackPower::Off));
    }

    #[test]
    fn emergency_stop_broadcast() {
        let msg = parse(&[0x06, 0x00, 0x40, 0x00, 0x81, 0x81]).unwrap();
        assert_eq!(msg, Message::EmergencyStop);
    }

    #[test]
    fn rejected_command_answer() {
        let msg = parse(&[0x07, 0x00, 0x40, 0x00, 0x61, 0x82, 0xE3]).unwrap();
        assert_eq!(msg, Message::UnknownCommand);
    }

    #[test]
    fn checksum_mismatch_is_not_dispatched() {
        let err = parse(&[0x07, 0x00, 0x40, 0x00, 0x61, 0x00, 0x60]).unwrap_err();
        assert_eq!(err, Error::Checksum);
    }

    #[test]
    fn hardware_info_answer() {
        let msg = parse(&[
            0x0C, 0x00, 0x1A, 0x00, 0x01, 0x02, 0x00, 0x00, 0x43, 0x01, 0x00, 0x00,
        ])
        .unwrap();
        assert_eq!(
            msg,
            Message::HardwareInfo(HardwareInfo {
                hardware_type: HardwareType::Z21New,
                firmware: FirmwareVersion::new(1, 43),
            })
        );
    }

    #[test]
    fn system_state_readings() {
        let mut raw = [0u8; 20];
        raw[0] = 0x14;
        raw[2] = 0x84;
        LittleEndian::write_i16(&mut raw[4..6], 1500);
        LittleEndian::write_i16(&mut raw[6..8], 500);
        LittleEndian::write_i16(&mut raw[8..10], 1400);
        LittleEndian::write_i16(&mut raw[10..12], 35);
        LittleEndian::write_i16(&mut raw[12..14], 18000);
        LittleEndian::write_i16(&mut raw[14..16], 16500);

        match parse(&raw).unwrap() {
            Message::SystemState(state) => {
                assert_eq!(state.vcc_voltage, 16500);
                assert_eq!(state.temperature, 35);
                assert_eq!(state.main_current, 1500);
                assert_eq!(state.prog_current, 500);
                assert_eq!(state.central_state, CentralState::empty());
                assert_eq!(state.capabilities, None);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn system_state_capability_octet_needs_recent_firmware() {
        let mut raw = [0u8; 20];
        raw[0] = 0x14;
        raw[2] = 0x84;
        raw[19] = 0x09;

        let ctx = DecodeContext {
            firmware: Some(FirmwareVersion::new(1, 43)),
            hardware: Some(HardwareType::Z21New),
        };
        match parse_with(&raw, &ctx).unwrap() {
            Message::SystemState(state) => {
                assert_eq!(
                    state.capabilities,
                    Some(Capabilities::DCC | Capabilities::RAILCOM)
                );
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn entry_level_hardware_zeroes_prog_current() {
        let mut raw = [0u8; 20];
        raw[0] = 0x14;
        raw[2] = 0x84;
        LittleEndian::write_i16(&mut raw[6..8], 500);

        let ctx = DecodeContext {
            firmware: Some(FirmwareVersion::new(1, 30)),
            hardware: Some(HardwareType::Z21Start),
        };
        match parse_with(&raw, &ctx).unwrap() {
            Message::SystemState(state) => assert_eq!(state.prog_current, 0),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn loco_info_answer() {
        // Address 3, 128 steps, forward at speed 5, F0 and F2 on.
        let mut raw = [
            0x0E, 0x00, 0x40, 0x00, 0xEF, 0x00, 0x03, 0x04, 0x86, 0x12, 0x00, 0x00, 0x00, 0x00,
        ];
        raw[13] = raw[4..13].iter().fold(0, |acc, b| acc ^ b);

        match parse(&raw).unwrap() {
            Message::LocoInfo(info) => {
                assert_eq!(info.address, LocoAddress::new(3));
                assert_eq!(info.steps, NativeSpeedSteps::Steps128);
                assert_eq!(info.direction, Direction::Forward);
                assert_eq!(info.speed, 5);
                assert_eq!(info.protocol, None);
                assert!(info.function(0));
                assert!(info.function(2));
                assert!(!info.function(1));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn loco_mode_answer() {
        let msg = parse(&[0x07, 0x00, 0x60, 0x00, 0x00, 0x03, 0x01]).unwrap();
        assert_eq!(
            msg,
            Message::LocoMode {
                address: LocoAddress::new(3),
                protocol: DecoderProtocol::Motorola,
            }
        );
    }

    #[test]
    fn turnout_info_answer() {
        let mut raw = [0x09, 0x00, 0x40, 0x00, 0x43, 0x00, 0x05, 0x02, 0x00];
        raw[8] = raw[4..8].iter().fold(0, |acc, b| acc ^ b);
        let msg = parse(&raw).unwrap();
        assert_eq!(
            msg,
            Message::TurnoutInfo {
                address: TurnoutAddress::new(5),
                position: TurnoutPosition::Position2,
            }
        );
    }

    #[test]
    fn firmware_version_answer() {
        let mut raw = [0x09, 0x00, 0x40, 0x00, 0xF3, 0x0A, 0x01, 0x43, 0x00];
        raw[8] = raw[4..8].iter().fold(0, |acc, b| acc ^ b);
        let msg = parse(&raw).unwrap();
        assert_eq!(msg, Message::FirmwareVersion(FirmwareVersion::new(1, 43)));
    }

    #[test]
    fn rbus_feedback_answer() {
        let raw = [
            0x0F, 0x00, 0x80, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x80,
        ];
        match parse(&raw).unwrap() {
            Message::RBusData(data) => {
                assert_eq!(data.group, 1);
                assert!(data.input(0));
                assert!(data.input(79));
                assert!(!data.input(1));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn railcom_answer() {
        let mut raw = [0u8; 15];
        raw[0] = 0x0F;
        raw[2] = 0x88;
        LittleEndian::write_u16(&mut raw[4..6], 42);
        LittleEndian::write_u32(&mut raw[6..10], 1000);
        LittleEndian::write_u16(&mut raw[10..12], 7);
        raw[13] = 55;

        match parse(&raw).unwrap() {
            Message::RailComData(data) => {
                assert_eq!(data.address, LocoAddress::new(42));
                assert_eq!(data.receive_counter, 1000);
                assert_eq!(data.error_counter, 7);
                assert_eq!(data.speed, 55);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn loco_slot_answer() {
        let mut raw = [0u8; 24];
        raw[0] = 0x18;
        raw[2] = 0xAF;
        raw[7] = 9; // slot
        LittleEndian::write_u16(&mut raw[9..11], 1203);
        raw[12] = 0x07; // raw speed 7
        raw[13] = 0x10; // F12 overflow
        raw[14] = 0x00; // bit 0x20 clear: forward
        raw[15] = 0x01; // F5
        raw[18] = 9; // DCC, 128 steps

        match parse(&raw).unwrap() {
            Message::LocoSlotInfo(info) => {
                assert_eq!(info.slot, 9);
                assert_eq!(info.address, LocoAddress::new(1203));
                assert_eq!(info.protocol, DecoderProtocol::Dcc);
                assert_eq!(info.steps, NativeSpeedSteps::Steps128);
                assert_eq!(info.direction, Direction::Forward);
                assert_eq!(info.speed, 6);
                assert_ne!(info.functions & (1 << 5), 0);
                assert_ne!(info.functions & (1 << 12), 0);
                assert_eq!(info.functions & (1 << 13), 0);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn unknown_header_is_rejected() {
        let err = parse(&[0x05, 0x00, 0x99, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, Error::Unrecognized);
    }

    #[test]
    fn multi_frame_datagram_parses_in_order() {
        let datagram = [
            0x08, 0x00, 0x10, 0x00, 0x40, 0xE2, 0x01, 0x00, // serial
            0x07, 0x00, 0x40, 0x00, 0x61, 0x01, 0x60, // track power on
        ];
        let messages: Vec<Message> = Datagrams::new(&datagram)
            .map(|frame| Message::parse(&frame.unwrap(), &DecodeContext::default()).unwrap())
            .collect();
        assert_eq!(
            messages,
            vec![
                Message::SerialNumber(123_456),
                Message::TrackPower(TrackPower::On),
            ]
        );
    }
}
