//! Command path root.
//!
//! Enable requests, reset and set-points, arbitrated by source permission.
//! Discrete pins feed the same path through [`CommandPath::apply_discrete`].

pub mod arbitration;
pub mod discrete;

use gun_common::gun::analog::OutOfRange;
use gun_common::gun::interface::{ConfigReceived, ControlSource};
use thiserror::Error;

pub use arbitration::CommandPath;

/// Which set-point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    HighVoltage,
    PulseTop,
    Heater,
}

impl Reference {
    pub const ALL: [Self; 3] = [Self::HighVoltage, Self::PulseTop, Self::Heater];

    /// `control_config` bit set when CAN delivers this set-point.
    pub const fn received_flag(self) -> ConfigReceived {
        match self {
            Self::HighVoltage => ConfigReceived::HIGH_VOLTAGE,
            Self::PulseTop => ConfigReceived::PULSE_TOP,
            Self::Heater => ConfigReceived::HEATER,
        }
    }
}

/// A decoded command from any source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    HeaterEnable(bool),
    HvEnable(bool),
    BeamEnable(bool),
    /// Clear latched faults at the next control service.
    Reset,
    SetPoint(Reference, u16),
}

impl Command {
    /// Needs control (rather than reference) permission.
    pub const fn is_control(&self) -> bool {
        !matches!(self, Self::SetPoint(..))
    }
}

/// Rejected command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{origin} may not send enable or reset commands")]
    ControlNotPermitted { origin: ControlSource },

    #[error("{origin} may not send set-points")]
    ReferenceNotPermitted { origin: ControlSource },

    #[error("{reference:?} set-point rejected")]
    OutOfRange {
        reference: Reference,
        #[source]
        range: OutOfRange,
    },
}
