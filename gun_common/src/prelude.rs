//! Prelude module for common re-exports.
//!
//! ```rust
//! use gun_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::gun::config::BoardConfig;

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CONFIG_PATH, TICK_TIME_US};

// ─── Board vocabulary ───────────────────────────────────────────────
pub use crate::gun::fault::{Fault, FaultRegister, Warning, WarningRegister};
pub use crate::gun::interface::{CommandPermissions, ConfigReceived, ControlSource};
pub use crate::gun::state::{ControlState, StateMessage};

// ─── Modbus ─────────────────────────────────────────────────────────
pub use crate::modbus::consts::{ExceptionCode, FunctionCode};

/// Control tick period as Duration.
pub const TICK_TIME: Duration = Duration::from_micros(TICK_TIME_US);
