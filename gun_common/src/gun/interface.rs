//! Control interfaces, command sources and the permissions derived from them.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Origin of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ControlSource {
    Discrete = 0,
    Can = 1,
    Modbus = 2,
    Ethernet = 3,
}

impl ControlSource {
    pub const ALL: [Self; 4] = [Self::Discrete, Self::Can, Self::Modbus, Self::Ethernet];

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Discrete),
            1 => Some(Self::Can),
            2 => Some(Self::Modbus),
            3 => Some(Self::Ethernet),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discrete => "discrete",
            Self::Can => "can",
            Self::Modbus => "modbus",
            Self::Ethernet => "ethernet",
        }
    }
}

impl std::fmt::Display for ControlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface modes selected for the board.
///
/// ```toml
/// [interface]
/// ethernet = true
/// modbus_monitor = true
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceModes {
    pub can: bool,
    pub discrete: bool,
    pub modbus: bool,
    pub ethernet: bool,
    /// Modbus read access without control.
    pub modbus_monitor: bool,
    /// CAN port enabled for test and debug alongside another mode.
    pub option_enable_can: bool,
}

impl Default for InterfaceModes {
    /// A37474-000: Ethernet interface with Modbus monitoring.
    fn default() -> Self {
        Self {
            can: false,
            discrete: false,
            modbus: false,
            ethernet: true,
            modbus_monitor: true,
            option_enable_can: false,
        }
    }
}

impl InterfaceModes {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.can || self.discrete || self.modbus || self.ethernet) {
            return Err(ConfigError::ValidationError(
                "no reference source selected".to_string(),
            ));
        }
        if self.can && self.option_enable_can {
            return Err(ConfigError::ValidationError(
                "option_enable_can is not a valid modifier to the CAN interface".to_string(),
            ));
        }
        if self.discrete && (self.can || self.modbus) {
            return Err(ConfigError::ValidationError(
                "multiple references selected".to_string(),
            ));
        }
        Ok(())
    }
}

bitflags! {
    /// What each source may do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandPermissions: u16 {
        const DISCRETE_CONTROLS  = 1 << 0;
        const CAN_CONTROLS       = 1 << 1;
        const CAN_REFERENCE      = 1 << 2;
        const CAN_ENABLED        = 1 << 3;
        const MODBUS_CONTROLS    = 1 << 4;
        const MODBUS_REFERENCE   = 1 << 5;
        const MODBUS_MONITOR     = 1 << 6;
        const ETHERNET_CONTROLS  = 1 << 7;
        const ETHERNET_REFERENCE = 1 << 8;
    }
}

impl CommandPermissions {
    pub fn from_modes(modes: &InterfaceModes) -> Self {
        let mut p = Self::empty();
        if modes.can {
            p |= Self::CAN_CONTROLS | Self::CAN_ENABLED | Self::CAN_REFERENCE;
        }
        if modes.discrete {
            p |= Self::DISCRETE_CONTROLS;
        }
        if modes.modbus {
            p |= Self::MODBUS_CONTROLS | Self::MODBUS_REFERENCE | Self::MODBUS_MONITOR;
        }
        if modes.modbus_monitor {
            p |= Self::MODBUS_MONITOR;
        }
        if modes.ethernet {
            p |= Self::ETHERNET_CONTROLS | Self::ETHERNET_REFERENCE;
        }
        if modes.option_enable_can {
            p |= Self::CAN_ENABLED;
        }
        p
    }

    /// Enable requests and reset.
    pub const fn allows_control(&self, source: ControlSource) -> bool {
        match source {
            ControlSource::Discrete => self.contains(Self::DISCRETE_CONTROLS),
            ControlSource::Can => self.contains(Self::CAN_CONTROLS),
            ControlSource::Modbus => self.contains(Self::MODBUS_CONTROLS),
            ControlSource::Ethernet => self.contains(Self::ETHERNET_CONTROLS),
        }
    }

    /// Register reads. A CAN port brought up for test and debug reads
    /// without controlling; Modbus reads need the monitor flag.
    pub const fn allows_monitor(&self, source: ControlSource) -> bool {
        match source {
            ControlSource::Discrete => self.contains(Self::DISCRETE_CONTROLS),
            ControlSource::Can => self.intersects(Self::CAN_CONTROLS.union(Self::CAN_ENABLED)),
            ControlSource::Modbus => self.contains(Self::MODBUS_MONITOR),
            ControlSource::Ethernet => self.contains(Self::ETHERNET_CONTROLS),
        }
    }

    /// Set-point writes.
    pub const fn allows_reference(&self, source: ControlSource) -> bool {
        match source {
            ControlSource::Discrete => false,
            ControlSource::Can => self.contains(Self::CAN_REFERENCE),
            ControlSource::Modbus => self.contains(Self::MODBUS_REFERENCE),
            ControlSource::Ethernet => self.contains(Self::ETHERNET_REFERENCE),
        }
    }
}

bitflags! {
    /// CAN set-points received so far (`control_config`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConfigReceived: u8 {
        const HIGH_VOLTAGE = 1 << 0;
        const PULSE_TOP    = 1 << 1;
        const HEATER       = 1 << 2;
    }
}

impl ConfigReceived {
    #[inline]
    pub const fn complete(&self) -> bool {
        self.contains(Self::all())
    }
}
