//! A37474 board configuration.
//!
//! Every field defaults to the A37474-000 build values, so an empty TOML file
//! (or one containing only `[shared]`) loads the stock board. Individual
//! fields can be overridden per installation.
//!
//! ```toml
//! [shared]
//! service_name = "gun-driver-bench"
//!
//! [interface]
//! ethernet = true
//! modbus_monitor = true
//!
//! [ethernet]
//! local_ip = "192.168.70.99"
//! port = 502
//!
//! [adc.hv_v_mon]
//! calibration = { scale = 0.34722, offset = 0 }
//! relative_trip = { scale = 0.2, floor = 1000, count = 500 }
//! ```

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts::*;
use crate::gun::analog::{
    AbsoluteTrip, AnalogInputConfig, AnalogOutputConfig, Calibration, RelativeTrip,
};
use crate::gun::digital::DigitalFilterConfig;
use crate::gun::interface::InterfaceModes;
use crate::modbus::consts::{MODBUS_200MS_DELAY, MODBUS_SLAVE_ADDR};

// ─── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub shared: SharedConfig,
    pub interface: InterfaceModes,
    pub timing: TimingConfig,
    pub control: ControlParams,
    pub limits: BoardLimits,
    pub adc: AdcCalibration,
    pub dac: DacCalibration,
    pub internal_adc: InternalAdcConfig,
    pub filters: DigitalFilterConfig,
    pub ethernet: EthernetConfig,
    pub modbus: ModbusConfig,
}

impl BoardConfig {
    /// Semantic checks that TOML parsing cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.interface.validate()?;
        self.limits.validate()?;
        self.control.validate()?;
        self.adc.validate()?;
        self.internal_adc.validate()?;
        self.modbus.validate()?;
        if self.ethernet.port == 0 {
            return Err(ConfigError::ValidationError(
                "ethernet.port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Heater warm-up time in ticks.
    ///
    /// The explicit `timing.heater_warm_up_time` wins; otherwise CAN control
    /// uses the short ECB-enforced value and every other mode the long one.
    pub fn effective_heater_warm_up_time(&self) -> u16 {
        match self.timing.heater_warm_up_time {
            Some(ticks) => ticks,
            None if self.interface.can => HEATER_WARM_UP_TIME_CAN,
            None => HEATER_WARM_UP_TIME,
        }
    }

    pub fn high_voltage_output(&self) -> AnalogOutputConfig {
        AnalogOutputConfig {
            calibration: self.dac.high_voltage,
            min: self.limits.hv_min_set,
            max: self.limits.hv_max_set,
        }
    }

    pub fn top_voltage_output(&self) -> AnalogOutputConfig {
        AnalogOutputConfig {
            calibration: self.dac.top_voltage,
            min: self.limits.top_min_set,
            max: self.limits.top_max_set,
        }
    }

    /// Customer-programmable heater range is capped at
    /// `max_program_htr_voltage`.
    pub fn heater_voltage_output(&self) -> AnalogOutputConfig {
        AnalogOutputConfig {
            calibration: self.dac.heater_voltage,
            min: self.limits.heater_voltage_min_set_point,
            max: self
                .limits
                .max_program_htr_voltage
                .min(self.limits.heater_voltage_max_set_point),
        }
    }

    pub fn monitor_output(calibration: Calibration) -> AnalogOutputConfig {
        AnalogOutputConfig {
            calibration,
            ..AnalogOutputConfig::default()
        }
    }
}

// ─── Timing ─────────────────────────────────────────────────────────

/// Timer durations, 10 ms ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heater_auto_restart_time: u16,
    pub power_supply_startup_time: u16,
    pub heater_regulation_time_period: u16,
    /// Overrides the mode-dependent default when set.
    pub heater_warm_up_time: Option<u16>,
    pub max_heater_ramp_up_time: u16,
    pub heater_ramp_up_time_period: u16,
    /// Current-limited ticks before `HeaterVoltageCurrentLimited` latches.
    pub heater_voltage_current_limited_fault_time: u16,
    /// [s] at the start of warm-up before current-limited time is counted.
    pub current_limited_fault_holdoff_time: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heater_auto_restart_time: HEATER_AUTO_RESTART_TIME,
            power_supply_startup_time: GUN_DRIVER_POWER_SUPPLY_STARTUP_TIME,
            heater_regulation_time_period: HEATER_REGULATION_TIME_PERIOD,
            heater_warm_up_time: None,
            max_heater_ramp_up_time: MAX_HEATER_RAMP_UP_TIME,
            heater_ramp_up_time_period: HEATER_RAMP_UP_TIME_PERIOD,
            heater_voltage_current_limited_fault_time: HEATER_VOLTAGE_CURRENT_LIMITED_FAULT_TIME,
            current_limited_fault_holdoff_time: CURRENT_LIMITED_FAULT_HOLDOFF_TIME,
        }
    }
}

// ─── System control parameters ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlParams {
    /// SPI communication fault once the leaky error count exceeds this.
    pub max_converter_logic_adc_read_errors: u16,
    pub max_heater_start_up_attempts: u16,
    /// Write attempts per DAC channel before giving up.
    pub max_dac_tx_attempts: u16,
    /// [mV]
    pub heater_ramp_up_increment: u16,
    /// [mV]
    pub heater_regulation_increment: u16,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            max_converter_logic_adc_read_errors: MAX_CONVERTER_LOGIC_ADC_READ_ERRORS,
            max_heater_start_up_attempts: MAX_HEATER_START_UP_ATTEMPTS,
            max_dac_tx_attempts: MAX_DAC_TX_ATTEMPTS,
            heater_ramp_up_increment: HEATER_RAMP_UP_INCREMENT,
            heater_regulation_increment: HEATER_REGULATION_INCREMENT,
        }
    }
}

impl ControlParams {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            (
                "max_converter_logic_adc_read_errors",
                self.max_converter_logic_adc_read_errors,
            ),
            ("max_heater_start_up_attempts", self.max_heater_start_up_attempts),
            ("max_dac_tx_attempts", self.max_dac_tx_attempts),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "control.{name} must be non-zero"
                )));
            }
        }
        Ok(())
    }
}

// ─── Limits ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardLimits {
    pub max_program_htr_voltage: u16,
    pub heater_voltage_max_set_point: u16,
    pub heater_voltage_min_set_point: u16,
    pub max_heater_current_during_ramp_up: u16,
    pub htr_oc_abs: u16,
    pub hv_max_set: u16,
    pub hv_min_set: u16,
    pub top_max_set: u16,
    pub top_min_set: u16,
    pub bias_over_voltage: u16,
    pub bias_under_voltage: u16,
}

impl Default for BoardLimits {
    fn default() -> Self {
        Self {
            max_program_htr_voltage: MAX_PROGRAM_HTR_VOLTAGE,
            heater_voltage_max_set_point: HEATER_VOLTAGE_MAX_SET_POINT,
            heater_voltage_min_set_point: HEATER_VOLTAGE_MIN_SET_POINT,
            max_heater_current_during_ramp_up: MAX_HEATER_CURRENT_DURING_RAMP_UP,
            htr_oc_abs: HTR_OC_ABS,
            hv_max_set: HV_MAX_SET_BOARD_SPEC,
            hv_min_set: HV_MIN_SET_BOARD_SPEC,
            top_max_set: TOP_MAX_SET_BOARD_SPEC,
            top_min_set: TOP_MIN_SET_BOARD_SPEC,
            bias_over_voltage: BIAS_OVER_VOLTAGE,
            bias_under_voltage: BIAS_UNDER_VOLTAGE,
        }
    }
}

impl BoardLimits {
    fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("hv", self.hv_min_set, self.hv_max_set),
            ("top", self.top_min_set, self.top_max_set),
            (
                "heater_voltage",
                self.heater_voltage_min_set_point,
                self.heater_voltage_max_set_point,
            ),
            ("bias", self.bias_under_voltage, self.bias_over_voltage),
        ];
        for (name, min, max) in ranges {
            if min >= max {
                return Err(ConfigError::ValidationError(format!(
                    "limits.{name}: minimum {min} must be below maximum {max}"
                )));
            }
        }
        if self.max_program_htr_voltage > self.heater_voltage_max_set_point {
            return Err(ConfigError::ValidationError(format!(
                "limits.max_program_htr_voltage {} exceeds heater_voltage_max_set_point {}",
                self.max_program_htr_voltage, self.heater_voltage_max_set_point
            )));
        }
        if self.max_heater_current_during_ramp_up > self.htr_oc_abs {
            return Err(ConfigError::ValidationError(
                "limits.max_heater_current_during_ramp_up exceeds htr_oc_abs".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Converter-logic-board ADC ──────────────────────────────────────

const fn input(scale: f64, offset: i32) -> AnalogInputConfig {
    AnalogInputConfig {
        calibration: Calibration::new(scale, offset),
        relative_trip: None,
        absolute_trip: None,
    }
}

const fn relative(scale: f64, offset: i32, floor: u16, count: u16) -> AnalogInputConfig {
    AnalogInputConfig {
        calibration: Calibration::new(scale, offset),
        relative_trip: Some(RelativeTrip {
            scale: 0.2,
            floor,
            count,
        }),
        absolute_trip: None,
    }
}

const fn absolute(scale: f64, over: u16, under: u16, count: u16) -> AnalogInputConfig {
    AnalogInputConfig {
        calibration: Calibration::new(scale, 0),
        relative_trip: None,
        absolute_trip: Some(AbsoluteTrip { over, under, count }),
    }
}

/// Per-channel calibration and trip settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcCalibration {
    pub adc_temperature: AnalogInputConfig,
    pub hv_v_mon: AnalogInputConfig,
    pub hv_i_mon: AnalogInputConfig,
    pub gun_i_peak: AnalogInputConfig,
    pub htr_v_mon: AnalogInputConfig,
    pub htr_i_mon: AnalogInputConfig,
    pub top_v_mon: AnalogInputConfig,
    pub bias_v_mon: AnalogInputConfig,
    pub v24_mon: AnalogInputConfig,
    pub temperature_mon: AnalogInputConfig,
    pub dac_monitor: AnalogInputConfig,
}

impl Default for AdcCalibration {
    fn default() -> Self {
        Self {
            adc_temperature: input(1.25, 0),
            hv_v_mon: relative(0.34722, 0, 1000, 500),
            hv_i_mon: input(0.10419, 0),
            gun_i_peak: input(0.17313, 0),
            htr_v_mon: relative(0.13875, 0, 200, 500),
            htr_i_mon: absolute(0.10419, HTR_OC_ABS, HTR_UC_ABS, 500),
            top_v_mon: relative(0.69438, 0, 1000, 500),
            bias_v_mon: absolute(0.34688, BIAS_OVER_VOLTAGE, BIAS_UNDER_VOLTAGE, 500),
            v24_mon: input(0.41688, 0),
            temperature_mon: input(0.08331, 20_400),
            dac_monitor: input(1.0, 0),
        }
    }
}

impl AdcCalibration {
    fn channels(&self) -> [(&'static str, &AnalogInputConfig); 11] {
        [
            ("adc_temperature", &self.adc_temperature),
            ("hv_v_mon", &self.hv_v_mon),
            ("hv_i_mon", &self.hv_i_mon),
            ("gun_i_peak", &self.gun_i_peak),
            ("htr_v_mon", &self.htr_v_mon),
            ("htr_i_mon", &self.htr_i_mon),
            ("top_v_mon", &self.top_v_mon),
            ("bias_v_mon", &self.bias_v_mon),
            ("v24_mon", &self.v24_mon),
            ("temperature_mon", &self.temperature_mon),
            ("dac_monitor", &self.dac_monitor),
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, channel) in self.channels() {
            let scale = channel.calibration.scale;
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "adc.{name}: scale must be finite and positive, got {scale}"
                )));
            }
            if let Some(trip) = channel.relative_trip {
                if !(trip.scale.is_finite() && trip.scale >= 0.0) {
                    return Err(ConfigError::ValidationError(format!(
                        "adc.{name}: relative trip scale must be finite and non-negative"
                    )));
                }
                if trip.count == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "adc.{name}: relative trip count must be non-zero"
                    )));
                }
            }
            if let Some(trip) = channel.absolute_trip {
                if trip.under > trip.over {
                    return Err(ConfigError::ValidationError(format!(
                        "adc.{name}: absolute under limit {} above over limit {}",
                        trip.under, trip.over
                    )));
                }
                if trip.count == 0 {
                    return Err(ConfigError::ValidationError(format!(
                        "adc.{name}: absolute trip count must be non-zero"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ─── DAC ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DacCalibration {
    pub high_voltage: Calibration,
    pub top_voltage: Calibration,
    pub heater_voltage: Calibration,
    pub monitor_heater_voltage: Calibration,
    pub monitor_heater_current: Calibration,
    pub monitor_cathode_voltage: Calibration,
    pub monitor_grid_voltage: Calibration,
}

impl Default for DacCalibration {
    fn default() -> Self {
        Self {
            high_voltage: Calibration::new(3.0, 0),
            top_voltage: Calibration::new(1.5, 0),
            heater_voltage: Calibration::new(7.5188, 0),
            monitor_heater_voltage: Calibration::default(),
            monitor_heater_current: Calibration::default(),
            monitor_cathode_voltage: Calibration::default(),
            monitor_grid_voltage: Calibration::default(),
        }
    }
}

// ─── Internal ADC ───────────────────────────────────────────────────

/// Controller-internal rail monitors, averaged over `average_samples`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalAdcConfig {
    pub pos_5v: Calibration,
    pub pos_15v: Calibration,
    pub neg_15v: Calibration,
    pub average_samples: u16,
}

impl Default for InternalAdcConfig {
    fn default() -> Self {
        Self {
            pos_5v: Calibration::new(0.15259, 0),
            pos_15v: Calibration::new(0.32328, 0),
            neg_15v: Calibration::new(0.32328, 0),
            average_samples: 128,
        }
    }
}

impl InternalAdcConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.average_samples == 0 {
            return Err(ConfigError::ValidationError(
                "internal_adc.average_samples must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Network ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthernetConfig {
    pub local_ip: Ipv4Addr,
    pub remote_ip: Ipv4Addr,
    pub port: u16,
}

impl Default for EthernetConfig {
    fn default() -> Self {
        Self {
            local_ip: ip_from_packed(DEFAULT_IP_ADDRESS),
            remote_ip: ip_from_packed(DEFAULT_REMOTE_IP_ADDRESS),
            port: DEFAULT_MODBUS_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    pub slave_address: u8,
    /// Serial line rate, recorded for RTU links.
    pub baud_rate: u32,
    /// Partial frames are discarded after this many idle ticks.
    pub receive_timeout_ticks: u16,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            slave_address: MODBUS_SLAVE_ADDR,
            baud_rate: UART1_BAUDRATE,
            receive_timeout_ticks: MODBUS_200MS_DELAY,
        }
    }
}

impl ModbusConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=247).contains(&self.slave_address) {
            return Err(ConfigError::ValidationError(format!(
                "modbus.slave_address {} outside 1..=247",
                self.slave_address
            )));
        }
        if self.baud_rate == 0 || self.receive_timeout_ticks == 0 {
            return Err(ConfigError::ValidationError(
                "modbus.baud_rate and receive_timeout_ticks must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
