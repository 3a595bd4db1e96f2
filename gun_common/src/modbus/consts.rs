//! Modbus RTU slave constants.

use static_assertions::const_assert_eq;

/// Address this board answers to.
pub const MODBUS_SLAVE_ADDR: u8 = 0x07;

/// Reflected CRC-16 polynomial.
pub const CRC_POLY: u16 = 0xA001;
/// CRC register seed.
pub const CRC_INIT: u16 = 0xFFFF;

/// Every request this slave accepts is exactly this long.
pub const ETMMODBUS_COMMAND_SIZE_MIN: usize = 8;

pub const SLAVE_BIT_ARRAY_SIZE: usize = 64;
pub const SLAVE_HOLD_REG_ARRAY_SIZE: usize = 64;
pub const SLAVE_INPUT_REG_ARRAY_SIZE: usize = 64;

const_assert_eq!(SLAVE_BIT_ARRAY_SIZE, 64);
const_assert_eq!(SLAVE_HOLD_REG_ARRAY_SIZE, 64);
const_assert_eq!(SLAVE_INPUT_REG_ARRAY_SIZE, 64);

/// Register words per read response.
pub const MAX_READ_REGISTERS: u16 = 125;
/// Bits per read-bits response.
pub const MAX_READ_BITS: u16 = 2000;

/// Largest response: address + function + byte count + 125 words + CRC.
pub const MAX_RESPONSE_SIZE: usize = 3 + 2 * MAX_READ_REGISTERS as usize + 2;
const_assert_eq!(MAX_RESPONSE_SIZE, 255);

/// Idle ticks before a partial frame is dropped (200 ms).
pub const MODBUS_200MS_DELAY: u16 = 20;

/// Marker in the processed message that an exception response is due.
pub const EXCEPTION_FLAGGED: u8 = 0x09;

/// Coil value for ON in a write-single-bit request.
pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

// ─── Function codes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadBits = 0x01,
    ReadRegisters = 0x03,
    ReadInputRegisters = 0x04,
    WriteBit = 0x05,
    WriteRegister = 0x06,
}

impl FunctionCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ReadBits),
            0x03 => Some(Self::ReadRegisters),
            0x04 => Some(Self::ReadInputRegisters),
            0x05 => Some(Self::WriteBit),
            0x06 => Some(Self::WriteRegister),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Function byte of an exception response.
    #[inline]
    pub const fn exception(code: u8) -> u8 {
        code | 0x80
    }
}

// ─── Exceptions ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalAddress = 0x02,
    IllegalValue = 0x03,
    DeviceFailure = 0x04,
}

impl ExceptionCode {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalAddress),
            0x03 => Some(Self::IllegalValue),
            0x04 => Some(Self::DeviceFailure),
            _ => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ─── Frame status ───────────────────────────────────────────────────

/// Outcome of checking a received frame. Only `CommandOk` is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameStatus {
    Crc = 10,
    SlaveAddress = 20,
    Function = 30,
    CommandOk = 40,
}

// ─── Receiver state ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ReceiverState {
    #[default]
    Idle = 0x01,
    Receiving = 0x02,
    Processing = 0x03,
    Transmitting = 0x04,
}

impl ReceiverState {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Idle),
            0x02 => Some(Self::Receiving),
            0x03 => Some(Self::Processing),
            0x04 => Some(Self::Transmitting),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_codes() {
        for code in [0x01, 0x03, 0x04, 0x05, 0x06] {
            assert_eq!(FunctionCode::from_u8(code).map(FunctionCode::code), Some(code));
        }
        assert_eq!(FunctionCode::from_u8(0x02), None);
        assert_eq!(FunctionCode::from_u8(0x10), None);
        assert_eq!(FunctionCode::exception(0x03), 0x83);
    }

    #[test]
    fn exception_codes() {
        assert_eq!(ExceptionCode::from_u8(4), Some(ExceptionCode::DeviceFailure));
        assert_eq!(ExceptionCode::from_u8(0), None);
        assert_eq!(ExceptionCode::IllegalAddress.code(), 0x02);
    }

    #[test]
    fn frame_status_codes() {
        assert_eq!(FrameStatus::Crc as u8, 10);
        assert_eq!(FrameStatus::SlaveAddress as u8, 20);
        assert_eq!(FrameStatus::Function as u8, 30);
        assert_eq!(FrameStatus::CommandOk as u8, 40);
    }

    #[test]
    fn receiver_states() {
        assert_eq!(ReceiverState::default(), ReceiverState::Idle);
        assert_eq!(ReceiverState::from_u8(0x04), Some(ReceiverState::Transmitting));
        assert_eq!(ReceiverState::from_u8(0x00), None);
    }
}
