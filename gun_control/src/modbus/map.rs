//! Register-map seam and the plain 64-entry tables.

use gun_common::modbus::consts::{
    ExceptionCode, SLAVE_BIT_ARRAY_SIZE, SLAVE_HOLD_REG_ARRAY_SIZE, SLAVE_INPUT_REG_ARRAY_SIZE,
};

/// Data model the slave dispatches to.
///
/// Addresses are zero-based table indices. Implementations return the
/// exception to send back; the slave never inspects the tables itself.
pub trait RegisterMap {
    fn read_bit(&self, address: u16) -> Result<bool, ExceptionCode>;

    fn read_holding(&self, address: u16) -> Result<u16, ExceptionCode>;

    fn read_input(&self, address: u16) -> Result<u16, ExceptionCode>;

    fn write_bit(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode>;

    fn write_holding(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode>;
}

#[inline]
fn slot(address: u16, size: usize) -> Result<usize, ExceptionCode> {
    let index = usize::from(address);
    if index < size {
        Ok(index)
    } else {
        Err(ExceptionCode::IllegalAddress)
    }
}

/// Bit, holding-register and input-register tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusTables {
    pub bits: [bool; SLAVE_BIT_ARRAY_SIZE],
    pub holding: [u16; SLAVE_HOLD_REG_ARRAY_SIZE],
    pub input: [u16; SLAVE_INPUT_REG_ARRAY_SIZE],
}

impl Default for ModbusTables {
    fn default() -> Self {
        Self {
            bits: [false; SLAVE_BIT_ARRAY_SIZE],
            holding: [0; SLAVE_HOLD_REG_ARRAY_SIZE],
            input: [0; SLAVE_INPUT_REG_ARRAY_SIZE],
        }
    }
}

impl RegisterMap for ModbusTables {
    fn read_bit(&self, address: u16) -> Result<bool, ExceptionCode> {
        Ok(self.bits[slot(address, SLAVE_BIT_ARRAY_SIZE)?])
    }

    fn read_holding(&self, address: u16) -> Result<u16, ExceptionCode> {
        Ok(self.holding[slot(address, SLAVE_HOLD_REG_ARRAY_SIZE)?])
    }

    fn read_input(&self, address: u16) -> Result<u16, ExceptionCode> {
        Ok(self.input[slot(address, SLAVE_INPUT_REG_ARRAY_SIZE)?])
    }

    fn write_bit(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        self.bits[slot(address, SLAVE_BIT_ARRAY_SIZE)?] = value;
        Ok(())
    }

    fn write_holding(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        self.holding[slot(address, SLAVE_HOLD_REG_ARRAY_SIZE)?] = value;
        Ok(())
    }
}
