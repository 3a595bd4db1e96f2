//! Modbus RTU vocabulary shared by the slave and its tests.

pub mod consts;
pub mod crc;
