//! # A37474 Gun Driver Control Library
//!
//! Control software for a pulsed electron-gun driver: the converter-logic
//! board is sampled and driven once per 10 ms tick, faults and warnings are
//! latched into registers, and the whole state is exposed to a Modbus RTU
//! master.
//!
//! ## Roles
//!
//! The single [`state::GlobalControlState`] record is written through three
//! role views, each holding the `&mut` borrow for as long as it runs:
//!
//! 1. **Sampling** ([`sampling::SamplingPath`]): measured inputs, trips, warnings
//! 2. **Command** ([`command::CommandPath`]): source arbitration, requests, set-points
//! 3. **Control** ([`control::ControlPath`]): timers, reset, watchdog, output gating
//!
//! [`tick::TickRunner`] runs the roles in order against a
//! [`board::ConverterBoard`]; [`server::ModbusServer`] serves the shadow
//! tables from another thread through the same mutex.

pub mod board;
pub mod command;
pub mod control;
pub mod diagnostics;
pub mod modbus;
pub mod sampling;
pub mod server;
pub mod state;
pub mod tick;
pub mod watchdog;
