//! Z21 LAN frame envelope and message codec.
//!
//! A frame is a little-endian length (total, inclusive), a little-endian
//! header word and a payload. Frames with the X-Bus header carry an
//! X-header octet at the start of the payload and an XOR checksum as its
//! last octet. One UDP datagram may concatenate several frames.

use core::fmt;

mod field {
    pub type Field = core::ops::Range<usize>;
    pub type Rest = core::ops::RangeFrom<usize>;
    pub type Single = usize;
}

pub mod construct;
mod message;

pub use self::message::{DecodeContext, Message};

use byteorder::{ByteOrder, LittleEndian};

/// Frame headers, as written to the wire in little-endian.
pub mod headers {
    pub const GET_SERIAL_NUMBER: u16 = 0x0010;
    pub const GET_CODE: u16 = 0x0018;
    pub const GET_HWINFO: u16 = 0x001A;
    pub const LOGOFF: u16 = 0x0030;
    pub const XBUS: u16 = 0x0040;
    pub const SET_BROADCASTFLAGS: u16 = 0x0050;
    pub const GET_BROADCASTFLAGS: u16 = 0x0051;
    pub const GET_LOCOMODE: u16 = 0x0060;
    pub const SET_LOCOMODE: u16 = 0x0061;
    pub const GET_TURNOUTMODE: u16 = 0x0070;
    pub const SET_TURNOUTMODE: u16 = 0x0071;
    pub const RBUS_DATACHANGED: u16 = 0x0080;
    pub const RBUS_GETDATA: u16 = 0x0081;
    pub const SYSTEMSTATE_DATACHANGED: u16 = 0x0084;
    pub const SYSTEMSTATE_GETDATA: u16 = 0x0085;
    pub const RAILCOM_DATACHANGED: u16 = 0x0088;
    pub const RAILCOM_GETDATA: u16 = 0x0089;
    pub const LOCO_SLOT_INFO: u16 = 0x00AF;
}

/// X-header octets of the X-Bus envelope.
pub mod xheaders {
    pub const GET_STATE: u8 = 0x21;
    pub const TURNOUT_INFO: u8 = 0x43;
    pub const SET_TURNOUT: u8 = 0x53;
    pub const BC_TRACK_POWER: u8 = 0x61;
    pub const STATUS_CHANGED: u8 = 0x62;
    pub const SET_STOP: u8 = 0x80;
    pub const BC_STOPPED: u8 = 0x81;
    pub const GET_LOCO_INFO: u8 = 0xE3;
    pub const SET_LOCO: u8 = 0xE4;
    pub const LOCO_INFO: u8 = 0xEF;
    pub const GET_FIRMWARE_VERSION: u8 = 0xF1;
    pub const FIRMWARE_VERSION: u8 = 0xF3;
}

/// Parsing of a frame failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The buffer ends before the frame does.
    Truncated,
    /// A length or content field contradicts the message layout.
    Malformed,
    /// The X-Bus checksum does not cover the frame content.
    Checksum,
    /// The header or X-header is not one this library speaks.
    Unrecognized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "truncated"),
            Error::Malformed => write!(f, "malformed"),
            Error::Checksum => write!(f, "checksum mismatch"),
            Error::Unrecognized => write!(f, "unrecognized"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Length of the length and header words preceding the payload.
pub const HEADER_LEN: usize = 4;

/// Capacity of an outbound frame buffer. The longest command frame is the
/// ten-octet loco drive; inbound frames are parsed in place.
pub const MAX_FRAME_LEN: usize = 32;

/// An outbound frame under construction.
pub type FrameBuffer = heapless::Vec<u8, MAX_FRAME_LEN>;

mod frame_field {
    use super::field::*;

    pub const LENGTH: Field = 0..2;
    pub const HEADER: Field = 2..4;
    pub const PAYLOAD: Rest = 4..;
    pub const X_HEADER: Single = 4;
}

/// A read/write wrapper around a Z21 LAN frame buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Frame<T> {
    /// Imbue a raw octet buffer with frame structure.
    pub const fn new_unchecked(buffer: T) -> Frame<T> {
        Frame { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Frame<T>> {
        let frame = Self::new_unchecked(buffer);
        frame.check_len()?;
        Ok(frame)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the
    /// envelope or than the frame's own length field, and
    /// `Err(Error::Malformed)` if the length field undercuts the envelope.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else if (self.total_len() as usize) < HEADER_LEN {
            Err(Error::Malformed)
        } else if len < self.total_len() as usize {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Consume the frame, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the total length field.
    #[inline]
    pub fn total_len(&self) -> u16 {
        LittleEndian::read_u16(&self.buffer.as_ref()[frame_field::LENGTH])
    }

    /// Return the header word.
    #[inline]
    pub fn header(&self) -> u16 {
        LittleEndian::read_u16(&self.buffer.as_ref()[frame_field::HEADER])
    }

    /// Whether this frame carries an X-Bus envelope.
    #[inline]
    pub fn is_xbus(&self) -> bool {
        self.header() == headers::XBUS
    }

    /// Return the X-header octet.
    ///
    /// # Panics
    /// The method panics if the frame has an empty payload.
    #[inline]
    pub fn x_header(&self) -> u8 {
        self.buffer.as_ref()[frame_field::X_HEADER]
    }

    /// Verify the trailing XOR checksum of an X-Bus frame.
    ///
    /// The checksum covers the X-header and every data octet.
    pub fn verify_checksum(&self) -> bool {
        let total = self.total_len() as usize;
        if total < HEADER_LEN + 2 {
            return false;
        }
        let data = self.buffer.as_ref();
        xor(&data[HEADER_LEN..total - 1]) == data[total - 1]
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Frame<&'a T> {
    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let total = self.total_len() as usize;
        &self.buffer.as_ref()[HEADER_LEN..total]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        LittleEndian::write_u16(&mut self.buffer.as_mut()[frame_field::LENGTH], value);
    }

    #[inline]
    pub fn set_header(&mut self, value: u16) {
        LittleEndian::write_u16(&mut self.buffer.as_mut()[frame_field::HEADER], value);
    }

    /// Return a mutable pointer to the payload.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let total = self.total_len() as usize;
        &mut self.buffer.as_mut()[frame_field::PAYLOAD.start..total]
    }

    /// Write the trailing XOR checksum of an X-Bus frame.
    pub fn fill_checksum(&mut self) {
        let total = self.total_len() as usize;
        let data = self.buffer.as_mut();
        data[total - 1] = xor(&data[HEADER_LEN..total - 1]);
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Frame<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Iterator over the frames concatenated in one UDP datagram.
///
/// Yields each intact frame left to right. The first malformed or
/// truncated length field ends iteration and the remaining octets are
/// discarded, surfacing as one trailing `Err`.
pub struct Datagrams<'a> {
    remaining: &'a [u8],
}

impl<'a> Datagrams<'a> {
    pub fn new(datagram: &'a [u8]) -> Self {
        Datagrams {
            remaining: datagram,
        }
    }
}

impl<'a> Iterator for Datagrams<'a> {
    type Item = Result<Frame<&'a [u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        if self.remaining.len() < 2 {
            self.remaining = &[];
            return Some(Err(Error::Truncated));
        }
        let total = LittleEndian::read_u16(self.remaining) as usize;
        if total < HEADER_LEN {
            self.remaining = &[];
            return Some(Err(Error::Malformed));
        }
        if total > self.remaining.len() {
            self.remaining = &[];
            return Some(Err(Error::Truncated));
        }
        let (frame, rest) = self.remaining.split_at(total);
        self.remaining = rest;
        Some(Ok(Frame::new_unchecked(frame)))
    }
}
