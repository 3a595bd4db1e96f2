//! Request dispatch.

use gun_common::modbus::consts::{
    COIL_OFF, COIL_ON, ExceptionCode, FrameStatus, FunctionCode, MAX_READ_BITS,
    MAX_READ_REGISTERS, SLAVE_BIT_ARRAY_SIZE, SLAVE_HOLD_REG_ARRAY_SIZE,
    SLAVE_INPUT_REG_ARRAY_SIZE,
};
use tracing::{debug, trace};

use super::frame::{
    Frame, FrameError, Request, ResponseBuilder, exception_response, fixed_frame, parse_request,
};
use super::map::RegisterMap;

/// Per-slave counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlaveStats {
    pub received: u64,
    pub answered: u64,
    pub exceptions: u64,
    pub crc_errors: u64,
    pub address_mismatches: u64,
    pub function_errors: u64,
}

impl SlaveStats {
    fn count(&mut self, status: FrameStatus) {
        match status {
            FrameStatus::Crc => self.crc_errors += 1,
            FrameStatus::SlaveAddress => self.address_mismatches += 1,
            FrameStatus::Function => self.function_errors += 1,
            FrameStatus::CommandOk => {}
        }
    }
}

/// Modbus RTU slave.
#[derive(Debug, Clone)]
pub struct ModbusSlave {
    address: u8,
    stats: SlaveStats,
}

impl ModbusSlave {
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            stats: SlaveStats {
                received: 0,
                answered: 0,
                exceptions: 0,
                crc_errors: 0,
                address_mismatches: 0,
                function_errors: 0,
            },
        }
    }

    #[inline]
    pub const fn address(&self) -> u8 {
        self.address
    }

    #[inline]
    pub const fn stats(&self) -> &SlaveStats {
        &self.stats
    }

    /// Handle one complete frame.
    ///
    /// Returns `None` for frames that must not be answered (bad CRC, short,
    /// or addressed to another slave). Unsupported functions get an
    /// illegal-function exception.
    pub fn handle<M: RegisterMap + ?Sized>(&mut self, frame: &[u8], map: &mut M) -> Option<Frame> {
        self.stats.received += 1;
        let request = match parse_request(frame, self.address) {
            Ok(request) => request,
            Err(FrameError::Function(code)) => {
                self.stats.count(FrameStatus::Function);
                debug!(function = code, "unsupported Modbus function");
                return Some(self.exception(code, ExceptionCode::IllegalFunction));
            }
            Err(e) => {
                self.stats.count(e.status());
                trace!(error = %e, "Modbus frame dropped");
                return None;
            }
        };

        let result = match request.function {
            FunctionCode::ReadBits => self.read_bits(&request, map),
            FunctionCode::ReadRegisters => {
                self.read_registers(&request, SLAVE_HOLD_REG_ARRAY_SIZE, |a| map.read_holding(a))
            }
            FunctionCode::ReadInputRegisters => {
                self.read_registers(&request, SLAVE_INPUT_REG_ARRAY_SIZE, |a| map.read_input(a))
            }
            FunctionCode::WriteBit => Self::write_bit(&request, map).map(|()| self.echo(&request)),
            FunctionCode::WriteRegister => map
                .write_holding(request.address, request.value)
                .map(|()| self.echo(&request)),
        };

        match result {
            Ok(response) => {
                self.stats.answered += 1;
                Some(response)
            }
            Err(code) => {
                debug!(
                    function = request.function.code(),
                    address = request.address,
                    ?code,
                    "Modbus exception"
                );
                Some(self.exception(request.function.code(), code))
            }
        }
    }

    fn exception(&mut self, function: u8, code: ExceptionCode) -> Frame {
        self.stats.exceptions += 1;
        exception_response(self.address, function, code)
    }

    fn echo(&self, request: &Request) -> Frame {
        // Same shape as the request, re-encoded with our address.
        fixed_frame(&request.encode())
    }

    fn read_bits<M: RegisterMap + ?Sized>(
        &self,
        request: &Request,
        map: &M,
    ) -> Result<Frame, ExceptionCode> {
        let quantity = check_quantity(request, MAX_READ_BITS, SLAVE_BIT_ARRAY_SIZE)?;
        let mut builder = ResponseBuilder::new(self.address, request.function.code());
        let byte_count = quantity.div_ceil(8);
        builder
            .push_u8(byte_count as u8)
            .map_err(|_| ExceptionCode::DeviceFailure)?;
        for chunk in 0..byte_count {
            let mut byte = 0u8;
            for bit in 0..8 {
                let offset = chunk * 8 + bit;
                if offset >= quantity {
                    break;
                }
                if map.read_bit(request.address + offset)? {
                    byte |= 1 << bit;
                }
            }
            builder.push_u8(byte).map_err(|_| ExceptionCode::DeviceFailure)?;
        }
        builder.finish().map_err(|_| ExceptionCode::DeviceFailure)
    }

    fn read_registers(
        &self,
        request: &Request,
        table_size: usize,
        mut read: impl FnMut(u16) -> Result<u16, ExceptionCode>,
    ) -> Result<Frame, ExceptionCode> {
        let quantity = check_quantity(request, MAX_READ_REGISTERS, table_size)?;
        let mut builder = ResponseBuilder::new(self.address, request.function.code());
        builder
            .push_u8((quantity * 2) as u8)
            .map_err(|_| ExceptionCode::DeviceFailure)?;
        for offset in 0..quantity {
            let value = read(request.address + offset)?;
            builder.push_u16(value).map_err(|_| ExceptionCode::DeviceFailure)?;
        }
        builder.finish().map_err(|_| ExceptionCode::DeviceFailure)
    }

    fn write_bit<M: RegisterMap + ?Sized>(request: &Request, map: &mut M) -> Result<(), ExceptionCode> {
        let value = match request.value {
            COIL_ON => true,
            COIL_OFF => false,
            _ => return Err(ExceptionCode::IllegalValue),
        };
        map.write_bit(request.address, value)
    }
}

/// Quantity must be 1..=max and the span must stay inside the table.
fn check_quantity(request: &Request, max: u16, table_size: usize) -> Result<u16, ExceptionCode> {
    let quantity = request.value;
    if quantity == 0 || quantity > max {
        return Err(ExceptionCode::IllegalValue);
    }
    if usize::from(request.address) + usize::from(quantity) > table_size {
        return Err(ExceptionCode::IllegalAddress);
    }
    Ok(quantity)
}
