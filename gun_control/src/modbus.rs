//! Modbus RTU slave.
//!
//! - `frame` - request decoding, response encoding
//! - `receiver` - byte-level receive state machine with idle timeout
//! - `slave` - function dispatch and exception mapping
//! - `map` - the `RegisterMap` seam and plain 64-entry tables
//! - `shadow` - the control-state view served to masters

pub mod frame;
pub mod map;
pub mod receiver;
pub mod shadow;
pub mod slave;

pub use map::{ModbusTables, RegisterMap};
pub use receiver::RtuReceiver;
pub use shadow::ControlShadow;
pub use slave::ModbusSlave;
