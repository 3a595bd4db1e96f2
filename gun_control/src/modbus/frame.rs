//! RTU frame codec.
//!
//! Requests are the fixed 8-byte form shared by functions 1, 3, 4, 5 and 6:
//! `slave | function | address (BE) | quantity-or-value (BE) | CRC (LE)`.

use gun_common::modbus::consts::{
    ETMMODBUS_COMMAND_SIZE_MIN, ExceptionCode, FrameStatus, FunctionCode, MAX_RESPONSE_SIZE,
};
use gun_common::modbus::crc::{check_crc, crc16_bytes};
use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;

/// Fixed-capacity wire buffer.
pub type Frame = Vec<u8, MAX_RESPONSE_SIZE>;

// Echoes and exception frames are built without a capacity check.
const_assert!(MAX_RESPONSE_SIZE >= ETMMODBUS_COMMAND_SIZE_MIN);

/// Copy a fixed-shape frame (echo, exception, response header) into a wire
/// buffer.
pub(crate) fn fixed_frame(bytes: &[u8]) -> Frame {
    let frame = Frame::from_slice(bytes);
    debug_assert!(frame.is_ok(), "{} bytes exceed the frame buffer", bytes.len());
    frame.unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("CRC mismatch")]
    Crc,

    #[error("frame addressed to slave {0:#04x}")]
    SlaveAddress(u8),

    #[error("unsupported function {0:#04x}")]
    Function(u8),

    #[error("response exceeds {MAX_RESPONSE_SIZE} bytes")]
    Overflow,
}

impl FrameError {
    /// Status code for the receive-side error counters.
    pub const fn status(&self) -> FrameStatus {
        match self {
            Self::TooShort(_) | Self::Crc | Self::Overflow => FrameStatus::Crc,
            Self::SlaveAddress(_) => FrameStatus::SlaveAddress,
            Self::Function(_) => FrameStatus::Function,
        }
    }
}

/// Decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub slave: u8,
    pub function: FunctionCode,
    /// Starting (or single) table index.
    pub address: u16,
    /// Quantity for reads, value for writes.
    pub value: u16,
}

impl Request {
    /// Encode with CRC. Used by tests and the bench as a master would.
    pub fn encode(&self) -> [u8; ETMMODBUS_COMMAND_SIZE_MIN] {
        let [ah, al] = self.address.to_be_bytes();
        let [vh, vl] = self.value.to_be_bytes();
        let body = [self.slave, self.function.code(), ah, al, vh, vl];
        let [cl, ch] = crc16_bytes(&body);
        [body[0], body[1], body[2], body[3], body[4], body[5], cl, ch]
    }
}

/// Validate and decode a received frame.
///
/// Check order: length, CRC, slave address, function.
pub fn parse_request(frame: &[u8], slave: u8) -> Result<Request, FrameError> {
    if frame.len() < ETMMODBUS_COMMAND_SIZE_MIN {
        return Err(FrameError::TooShort(frame.len()));
    }
    if !check_crc(frame) {
        return Err(FrameError::Crc);
    }
    if frame[0] != slave {
        return Err(FrameError::SlaveAddress(frame[0]));
    }
    let function = FunctionCode::from_u8(frame[1]).ok_or(FrameError::Function(frame[1]))?;
    Ok(Request {
        slave,
        function,
        address: u16::from_be_bytes([frame[2], frame[3]]),
        value: u16::from_be_bytes([frame[4], frame[5]]),
    })
}

/// Response under construction. [`finish`](Self::finish) appends the CRC.
pub struct ResponseBuilder {
    buf: Frame,
}

impl ResponseBuilder {
    pub fn new(slave: u8, function: u8) -> Self {
        Self {
            buf: fixed_frame(&[slave, function]),
        }
    }

    #[inline]
    pub fn push_u8(&mut self, byte: u8) -> Result<(), FrameError> {
        self.buf.push(byte).map_err(|_| FrameError::Overflow)
    }

    #[inline]
    pub fn push_u16(&mut self, word: u16) -> Result<(), FrameError> {
        self.buf
            .extend_from_slice(&word.to_be_bytes())
            .map_err(|_| FrameError::Overflow)
    }

    pub fn finish(mut self) -> Result<Frame, FrameError> {
        let crc = crc16_bytes(&self.buf);
        self.buf
            .extend_from_slice(&crc)
            .map_err(|_| FrameError::Overflow)?;
        Ok(self.buf)
    }
}

/// `slave | function | 0x80 | code | CRC`.
pub fn exception_response(slave: u8, function: u8, code: ExceptionCode) -> Frame {
    let body = [slave, FunctionCode::exception(function), code.code()];
    let [cl, ch] = crc16_bytes(&body);
    fixed_frame(&[body[0], body[1], body[2], cl, ch])
}
