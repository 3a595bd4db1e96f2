//! Converter-logic-board driver seam.
//!
//! This module defines:
//! - `ConverterBoard` trait - ADC / FPGA / DAC access used by the tick runner
//! - `BoardError` enum - error types for board operations
//! - the per-tick sample records passed from the board to the sampling path
//!
//! The only implementation shipped here is [`simulation::SimulationBoard`].

pub mod simulation;

use gun_common::gun::digital::FpgaReadout;
use thiserror::Error;

/// Error types for board operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// Board not initialised (or already shut down).
    #[error("converter board not initialised")]
    NotInitialized,

    /// ADC conversion could not be read.
    #[error("ADC read failed: {0}")]
    AdcRead(String),

    /// FPGA status word could not be read.
    #[error("FPGA read failed: {0}")]
    FpgaRead(String),

    /// One DAC transmission failed.
    #[error("DAC write to {channel:?} failed: {reason}")]
    DacWrite { channel: DacChannel, reason: String },
}

/// One converter-logic-board ADC scan, raw codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcFrame {
    pub adc_temperature: u16,
    pub hv_v_mon: u16,
    pub hv_i_mon: u16,
    pub gun_i_peak: u16,
    pub htr_v_mon: u16,
    pub htr_i_mon: u16,
    pub top_v_mon: u16,
    pub bias_v_mon: u16,
    pub v24_mon: u16,
    pub temperature_mon: u16,
    pub dac_monitor: u16,
    /// Warm-up, watchdog, arc, over-temp, pulse-width duty, grid.
    pub digital: [u16; 6],
}

/// Controller-internal rail monitors, raw codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternalAdcSample {
    pub pos_5v: u16,
    pub pos_15v: u16,
    pub neg_15v: u16,
}

/// Customer and interlock pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteInputs {
    pub customer_hv_on: bool,
    pub customer_beam_enable: bool,
    pub interlock_relay_closed: bool,
}

/// DAC channels written every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DacChannel {
    HighVoltage = 0,
    TopVoltage = 1,
    HeaterVoltage = 2,
    HvEnable = 3,
    HeaterEnable = 4,
    TopEnable = 5,
    TriggerEnable = 6,
    WatchdogOscillator = 7,
    MonitorHeaterVoltage = 8,
    MonitorHeaterCurrent = 9,
    MonitorCathodeVoltage = 10,
    MonitorGridVoltage = 11,
}

impl DacChannel {
    pub const COUNT: usize = 12;

    /// Write order used by the tick runner.
    pub const ALL: [Self; Self::COUNT] = [
        Self::HighVoltage,
        Self::TopVoltage,
        Self::HeaterVoltage,
        Self::HvEnable,
        Self::HeaterEnable,
        Self::TopEnable,
        Self::TriggerEnable,
        Self::WatchdogOscillator,
        Self::MonitorHeaterVoltage,
        Self::MonitorHeaterCurrent,
        Self::MonitorCathodeVoltage,
        Self::MonitorGridVoltage,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Access to the converter-logic board.
///
/// # Lifecycle
///
/// 1. `init()` - once before the tick loop
/// 2. `read_*` / `write_dac` - every tick, from the tick thread only
/// 3. `shutdown()` - once after the loop stops
pub trait ConverterBoard: Send {
    /// Driver identifier for logs.
    fn name(&self) -> &'static str;

    fn init(&mut self) -> Result<(), BoardError>;

    /// One ADC scan.
    fn read_adc(&mut self) -> Result<AdcFrame, BoardError>;

    /// FPGA revision and status word.
    fn read_fpga(&mut self) -> Result<FpgaReadout, BoardError>;

    /// One conversion of each internal rail monitor.
    fn read_internal_adc(&mut self) -> InternalAdcSample;

    fn read_discrete(&mut self) -> DiscreteInputs;

    /// Single transmission attempt. Retrying is the caller's job.
    fn write_dac(&mut self, channel: DacChannel, code: u16) -> Result<(), BoardError>;

    /// Default: nothing to release.
    fn shutdown(&mut self) -> Result<(), BoardError> {
        Ok(())
    }
}
