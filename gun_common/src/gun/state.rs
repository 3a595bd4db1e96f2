//! Control-state vocabulary.
//!
//! The numeric codes are the values reported over CAN and Modbus.
//! Only one `ControlState` is active at any time; the record that holds it
//! stores the enum, never a raw code.

use serde::{Deserialize, Serialize};

/// Gun-driver control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum ControlState {
    FaultHeaterFailure = 0,
    FaultWarmupHeaterOff = 10,
    FaultHeaterOff = 20,
    StartUp = 30,
    WaitForConfig = 40,
    ResetFpga = 50,
    HeaterDisabled = 60,
    HeaterRampUp = 70,
    HeaterWarmUp = 80,
    FaultHeaterOn = 90,
    HeaterWarmUpDone = 100,
    PowerSupplyRampUp = 110,
    HvOn = 120,
    TopOn = 130,
    TopReady = 140,
    BeamEnable = 150,
}

impl ControlState {
    /// All states in ascending code order.
    pub const ALL: [Self; 16] = [
        Self::FaultHeaterFailure,
        Self::FaultWarmupHeaterOff,
        Self::FaultHeaterOff,
        Self::StartUp,
        Self::WaitForConfig,
        Self::ResetFpga,
        Self::HeaterDisabled,
        Self::HeaterRampUp,
        Self::HeaterWarmUp,
        Self::FaultHeaterOn,
        Self::HeaterWarmUpDone,
        Self::PowerSupplyRampUp,
        Self::HvOn,
        Self::TopOn,
        Self::TopReady,
        Self::BeamEnable,
    ];

    /// Raw state code.
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Convert from a raw code. Returns `None` for codes that name no state.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::FaultHeaterFailure),
            10 => Some(Self::FaultWarmupHeaterOff),
            20 => Some(Self::FaultHeaterOff),
            30 => Some(Self::StartUp),
            40 => Some(Self::WaitForConfig),
            50 => Some(Self::ResetFpga),
            60 => Some(Self::HeaterDisabled),
            70 => Some(Self::HeaterRampUp),
            80 => Some(Self::HeaterWarmUp),
            90 => Some(Self::FaultHeaterOn),
            100 => Some(Self::HeaterWarmUpDone),
            110 => Some(Self::PowerSupplyRampUp),
            120 => Some(Self::HvOn),
            130 => Some(Self::TopOn),
            140 => Some(Self::TopReady),
            150 => Some(Self::BeamEnable),
            _ => None,
        }
    }

    /// True for the three heater-fault states below `StartUp`.
    #[inline]
    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            Self::FaultHeaterFailure
                | Self::FaultWarmupHeaterOff
                | Self::FaultHeaterOff
                | Self::FaultHeaterOn
        )
    }

    /// State message published for this state, if it has one.
    ///
    /// States without a message leave the previously published one in place.
    pub const fn message(self) -> Option<StateMessage> {
        match self {
            Self::StartUp => Some(StateMessage::StartUp),
            Self::HeaterRampUp => Some(StateMessage::HeaterRampUp),
            Self::HeaterWarmUp => Some(StateMessage::HeaterWarmUp),
            Self::HeaterWarmUpDone => Some(StateMessage::HeaterWarmUpDone),
            Self::HvOn => Some(StateMessage::HvOn),
            Self::BeamEnable => Some(StateMessage::BeamEnable),
            Self::FaultHeaterOff => Some(StateMessage::FaultHeaterOff),
            Self::FaultHeaterOn => Some(StateMessage::FaultHeaterOn),
            _ => None,
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::StartUp
    }
}

/// State message word exposed to the Modbus master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum StateMessage {
    StartUp = 0x0001,
    HeaterRampUp = 0x0003,
    HeaterWarmUp = 0x0007,
    HeaterWarmUpDone = 0x000B,
    HvOn = 0x002B,
    BeamEnable = 0x00AB,
    FaultHeaterOff = 0x0101,
    FaultHeaterOn = 0x010B,
}

impl StateMessage {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::StartUp),
            0x0003 => Some(Self::HeaterRampUp),
            0x0007 => Some(Self::HeaterWarmUp),
            0x000B => Some(Self::HeaterWarmUpDone),
            0x002B => Some(Self::HvOn),
            0x00AB => Some(Self::BeamEnable),
            0x0101 => Some(Self::FaultHeaterOff),
            0x010B => Some(Self::FaultHeaterOn),
            _ => None,
        }
    }

    /// Bit 8 marks a fault message.
    #[inline]
    pub const fn is_fault(self) -> bool {
        self.code() & 0x0100 != 0
    }
}
