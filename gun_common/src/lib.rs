//! Gun-driver common library
//!
//! Shared constants, board vocabulary and configuration loading for the
//! A37474 gun-driver workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Board constants (timers, limits, watchdog, network defaults)
//! - [`config`] - Configuration loading traits and types
//! - [`gun`] - Control states, fault registers, calibrated I/O, board config
//! - [`modbus`] - Modbus RTU constants and CRC
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use gun_common::prelude::*;
//!
//! let board = BoardConfig::default();
//! assert!(board.validate().is_ok());
//! ```

pub mod config;
pub mod consts;
pub mod gun;
pub mod modbus;
pub mod prelude;
