//! A37474 gun-driver vocabulary: states, faults, calibrated I/O and board
//! configuration.

pub mod analog;
pub mod config;
pub mod digital;
pub mod fault;
pub mod interface;
pub mod state;
