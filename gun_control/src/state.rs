//! Global control state.
//!
//! One [`GlobalControlState`] exists for the lifetime of the process. Fields
//! are crate-private; everything outside the crate reads through accessors
//! and writes through one of three role views:
//!
//! | View | Writes |
//! |---|---|
//! | [`SamplingPath`] | monitored inputs, digital status, error counters, warnings |
//! | [`CommandPath`] | enable requests, reset request, set-points, heater target, `control_config` |
//! | [`ControlPath`] | control state, fault clearing, timers, counters, heater regulation, output enables |
//!
//! Faults may be latched from the sampling or control path; only the control
//! path clears them.
//!
//! [`SharedControlState`] wraps the record in a mutex for the tick thread
//! and the Modbus connections. The CAN `control_config` bits are the only
//! cross-context flag and live in an atomic outside the lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gun_common::consts::DAC_DIGITAL_OFF;
use gun_common::gun::analog::{AnalogInput, AnalogInputConfig, AnalogOutput};
use gun_common::gun::config::BoardConfig;
use gun_common::gun::digital::{AdcDigitalLines, DigitalInput, FpgaReadout, FpgaStatus};
use gun_common::gun::fault::{FaultRegister, WarningRegister};
use gun_common::gun::interface::{CommandPermissions, ConfigReceived, ControlSource};
use gun_common::gun::state::{ControlState, StateMessage};

use crate::board::DacChannel;
use crate::command::CommandPath;
use crate::control::{ControlPath, Timers};
use crate::diagnostics::{AdcErrorTracker, DacWriteTracker};
use crate::modbus::map::ModbusTables;
use crate::sampling::SamplingPath;
use crate::watchdog::SpiWatchdog;

// ─── Sub-records ────────────────────────────────────────────────────

/// Pending enable requests from the command path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnableRequests {
    pub heater: bool,
    pub hv: bool,
    pub beam: bool,
}

/// One source's set-points [engineering units].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetPoints {
    pub high_voltage: u16,
    pub pulse_top: u16,
    pub heater: u16,
}

/// Set-points as last received from each reference-capable source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct References {
    pub can: SetPoints,
    pub ethernet: SetPoints,
    pub modbus: SetPoints,
}

impl References {
    /// `None` for the discrete source, which carries no references.
    pub fn for_source(&self, source: ControlSource) -> Option<&SetPoints> {
        match source {
            ControlSource::Discrete => None,
            ControlSource::Can => Some(&self.can),
            ControlSource::Modbus => Some(&self.modbus),
            ControlSource::Ethernet => Some(&self.ethernet),
        }
    }

    pub(crate) fn for_source_mut(&mut self, source: ControlSource) -> Option<&mut SetPoints> {
        match source {
            ControlSource::Discrete => None,
            ControlSource::Can => Some(&mut self.can),
            ControlSource::Modbus => Some(&mut self.modbus),
            ControlSource::Ethernet => Some(&mut self.ethernet),
        }
    }
}

/// Where the heater regulator is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaterPhase {
    #[default]
    Off,
    /// Stepping the output up toward the target.
    RampUp,
    /// At target, backing off while the heater is current limited.
    Regulating,
}

/// Heater regulator record. Counters are in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaterControl {
    /// Set-point requested by the commanding source [mV]. The heater output
    /// walks toward it.
    pub voltage_target: u16,
    pub phase: HeaterPhase,
    pub ramp_interval: u16,
    pub ramp_up_time: u16,
    pub regulation_interval: u16,
    /// Leaky count of current-limited ticks while regulating.
    pub voltage_current_limited: u16,
    /// True while current-limit faults are held off after warm-up.
    pub fault_holdoff_state: bool,
    pub fault_holdoff_count: u16,
    /// Starts since power-up. Cleared once a ramp reaches its target.
    pub start_up_attempts: u16,
}

/// Calibrated analog inputs.
#[derive(Debug, Clone)]
pub struct MonitoredInputs {
    pub adc_temperature: AnalogInput,
    pub hv_v_mon: AnalogInput,
    pub hv_i_mon: AnalogInput,
    pub gun_i_peak: AnalogInput,
    pub htr_v_mon: AnalogInput,
    pub htr_i_mon: AnalogInput,
    pub top_v_mon: AnalogInput,
    pub bias_v_mon: AnalogInput,
    pub v24_mon: AnalogInput,
    pub temperature_mon: AnalogInput,
    pub dac_monitor: AnalogInput,
    pub pos_5v: AnalogInput,
    pub pos_15v: AnalogInput,
    pub neg_15v: AnalogInput,
}

impl MonitoredInputs {
    fn new(config: &BoardConfig) -> Self {
        let adc = &config.adc;
        let rail = |calibration| {
            AnalogInput::new(AnalogInputConfig {
                calibration,
                ..AnalogInputConfig::default()
            })
        };
        Self {
            adc_temperature: AnalogInput::new(adc.adc_temperature),
            hv_v_mon: AnalogInput::new(adc.hv_v_mon),
            hv_i_mon: AnalogInput::new(adc.hv_i_mon),
            gun_i_peak: AnalogInput::new(adc.gun_i_peak),
            htr_v_mon: AnalogInput::new(adc.htr_v_mon),
            htr_i_mon: AnalogInput::new(adc.htr_i_mon),
            top_v_mon: AnalogInput::new(adc.top_v_mon),
            bias_v_mon: AnalogInput::new(adc.bias_v_mon),
            v24_mon: AnalogInput::new(adc.v24_mon),
            temperature_mon: AnalogInput::new(adc.temperature_mon),
            dac_monitor: AnalogInput::new(adc.dac_monitor),
            pos_5v: rail(config.internal_adc.pos_5v),
            pos_15v: rail(config.internal_adc.pos_15v),
            neg_15v: rail(config.internal_adc.neg_15v),
        }
    }

    pub(crate) fn reset_trips(&mut self) {
        for input in [
            &mut self.hv_v_mon,
            &mut self.htr_v_mon,
            &mut self.htr_i_mon,
            &mut self.top_v_mon,
            &mut self.bias_v_mon,
        ] {
            input.reset_trips();
        }
    }
}

/// Calibrated analog outputs.
#[derive(Debug, Clone)]
pub struct Outputs {
    pub high_voltage: AnalogOutput,
    pub top_voltage: AnalogOutput,
    pub heater_voltage: AnalogOutput,
    pub monitor_heater_voltage: AnalogOutput,
    pub monitor_heater_current: AnalogOutput,
    pub monitor_cathode_voltage: AnalogOutput,
    pub monitor_grid_voltage: AnalogOutput,
}

impl Outputs {
    fn new(config: &BoardConfig) -> Self {
        let monitor = |calibration| AnalogOutput::new(BoardConfig::monitor_output(calibration));
        Self {
            high_voltage: AnalogOutput::new(config.high_voltage_output()),
            top_voltage: AnalogOutput::new(config.top_voltage_output()),
            heater_voltage: AnalogOutput::new(config.heater_voltage_output()),
            monitor_heater_voltage: monitor(config.dac.monitor_heater_voltage),
            monitor_heater_current: monitor(config.dac.monitor_heater_current),
            monitor_cathode_voltage: monitor(config.dac.monitor_cathode_voltage),
            monitor_grid_voltage: monitor(config.dac.monitor_grid_voltage),
        }
    }
}

/// Codes written to the digital DAC channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DacDigital {
    pub hv_enable: u16,
    pub heater_enable: u16,
    pub top_enable: u16,
    pub trigger_enable: u16,
    pub watchdog_oscillator: u16,
}

impl Default for DacDigital {
    fn default() -> Self {
        Self {
            hv_enable: DAC_DIGITAL_OFF,
            heater_enable: DAC_DIGITAL_OFF,
            top_enable: DAC_DIGITAL_OFF,
            trigger_enable: DAC_DIGITAL_OFF,
            watchdog_oscillator: DAC_DIGITAL_OFF,
        }
    }
}

/// Number of FPGA status lines.
pub const FPGA_STATUS_LINES: usize = 19;
/// Number of ADC digital fault lines.
pub const ADC_DIGITAL_LINES: usize = 6;

static_assertions::const_assert_eq!(FpgaStatus::all().bits().count_ones() as usize, FPGA_STATUS_LINES);
static_assertions::const_assert_eq!(
    AdcDigitalLines::all().bits().count_ones() as usize,
    ADC_DIGITAL_LINES
);

/// Debounced FPGA status.
#[derive(Debug, Clone)]
pub struct FpgaInputs {
    filters: [DigitalInput; FPGA_STATUS_LINES],
    status: FpgaStatus,
    readout: FpgaReadout,
}

impl FpgaInputs {
    fn new(filter: u16) -> Self {
        Self {
            filters: [DigitalInput::new(filter); FPGA_STATUS_LINES],
            status: FpgaStatus::empty(),
            readout: FpgaReadout::default(),
        }
    }

    pub(crate) fn update(&mut self, readout: FpgaReadout) {
        let raw = readout.status();
        for (filter, line) in self.filters.iter_mut().zip(FpgaStatus::all().iter()) {
            let level = filter.update(raw.contains(line));
            self.status.set(line, level);
        }
        self.readout = readout;
    }

    /// Filtered status lines.
    #[inline]
    pub const fn status(&self) -> FpgaStatus {
        self.status
    }

    /// Last raw readout.
    #[inline]
    pub const fn readout(&self) -> &FpgaReadout {
        &self.readout
    }
}

/// Debounced ADC digital fault lines.
#[derive(Debug, Clone)]
pub struct AdcDigitalInputs {
    filters: [DigitalInput; ADC_DIGITAL_LINES],
    lines: AdcDigitalLines,
}

impl AdcDigitalInputs {
    fn new(filter: u16) -> Self {
        Self {
            filters: [DigitalInput::new(filter); ADC_DIGITAL_LINES],
            lines: AdcDigitalLines::empty(),
        }
    }

    pub(crate) fn update(&mut self, raw: AdcDigitalLines) {
        for (filter, line) in self.filters.iter_mut().zip(AdcDigitalLines::all().iter()) {
            let level = filter.update(raw.contains(line));
            self.lines.set(line, level);
        }
    }

    #[inline]
    pub const fn lines(&self) -> AdcDigitalLines {
        self.lines
    }
}

/// Debounced customer and interlock pins.
#[derive(Debug, Clone)]
pub struct DiscretePins {
    pub(crate) customer_hv_on: DigitalInput,
    pub(crate) customer_beam_enable: DigitalInput,
    pub(crate) interlock_relay_closed: DigitalInput,
}

impl DiscretePins {
    fn new(filter: u16) -> Self {
        Self {
            customer_hv_on: DigitalInput::new(filter),
            customer_beam_enable: DigitalInput::new(filter),
            interlock_relay_closed: DigitalInput::new(filter),
        }
    }

    #[inline]
    pub const fn customer_hv_on(&self) -> bool {
        self.customer_hv_on.level()
    }

    #[inline]
    pub const fn customer_beam_enable(&self) -> bool {
        self.customer_beam_enable.level()
    }

    #[inline]
    pub const fn interlock_relay_closed(&self) -> bool {
        self.interlock_relay_closed.level()
    }
}

// ─── control_config ─────────────────────────────────────────────────

/// CAN set-points received, shared across contexts without the lock.
#[derive(Debug, Clone, Default)]
pub struct ControlConfig(Arc<AtomicU8>);

impl ControlConfig {
    pub fn mark(&self, received: ConfigReceived) {
        self.0.fetch_or(received.bits(), Ordering::AcqRel);
    }

    pub fn load(&self) -> ConfigReceived {
        ConfigReceived::from_bits_truncate(self.0.load(Ordering::Acquire))
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

// ─── GlobalControlState ─────────────────────────────────────────────

/// The controller's single state record.
#[derive(Debug, Clone)]
pub struct GlobalControlState {
    pub(crate) settings: BoardConfig,

    // Control / mode
    pub(crate) control_state: ControlState,
    pub(crate) state_message: StateMessage,
    pub(crate) requests: EnableRequests,
    pub(crate) reset_active: bool,
    pub(crate) ethernet_reset_cmd: bool,
    pub(crate) permissions: CommandPermissions,
    pub(crate) previous_customer_hv_on: bool,

    // Timing / counters
    pub(crate) run_time_counter: u16,
    pub(crate) timers: Timers,
    pub(crate) heater: HeaterControl,
    pub(crate) watchdog: SpiWatchdog,

    // Analog
    pub(crate) inputs: MonitoredInputs,
    pub(crate) outputs: Outputs,
    pub(crate) dac_digital: DacDigital,

    // Digital
    pub(crate) fpga: FpgaInputs,
    pub(crate) adc_digital: AdcDigitalInputs,
    pub(crate) discrete: DiscretePins,

    pub(crate) faults: FaultRegister,
    pub(crate) warnings: WarningRegister,

    pub(crate) shadow: ModbusTables,

    pub(crate) adc_errors: AdcErrorTracker,
    pub(crate) dac_errors: DacWriteTracker,

    pub(crate) references: References,
    pub(crate) control_config: ControlConfig,
}

impl GlobalControlState {
    /// Build the start-up state from a validated configuration.
    pub fn new(config: &BoardConfig) -> Self {
        let mut discrete = DiscretePins::new(config.filters.discrete);
        // The interlock is assumed open until the board says otherwise.
        discrete.interlock_relay_closed.preset(false);

        let state = ControlState::default();
        Self {
            settings: config.clone(),
            control_state: state,
            state_message: state.message().unwrap_or(StateMessage::StartUp),
            requests: EnableRequests::default(),
            reset_active: false,
            ethernet_reset_cmd: false,
            permissions: CommandPermissions::from_modes(&config.interface),
            previous_customer_hv_on: false,
            run_time_counter: 0,
            timers: Timers::default(),
            heater: HeaterControl::default(),
            watchdog: SpiWatchdog::new(),
            inputs: MonitoredInputs::new(config),
            outputs: Outputs::new(config),
            dac_digital: DacDigital::default(),
            fpga: FpgaInputs::new(config.filters.fpga),
            adc_digital: AdcDigitalInputs::new(config.filters.adc_digital),
            discrete,
            faults: FaultRegister::empty(),
            warnings: WarningRegister::empty(),
            shadow: ModbusTables::default(),
            adc_errors: AdcErrorTracker::default(),
            dac_errors: DacWriteTracker::default(),
            references: References::default(),
            control_config: ControlConfig::default(),
        }
    }

    // ─── Role views ─────────────────────────────────────────────────

    pub fn sampling(&mut self) -> SamplingPath<'_> {
        SamplingPath::new(self)
    }

    pub fn command(&mut self) -> CommandPath<'_> {
        CommandPath::new(self)
    }

    pub fn control(&mut self) -> ControlPath<'_> {
        ControlPath::new(self)
    }

    // ─── Read access ────────────────────────────────────────────────

    #[inline]
    pub fn settings(&self) -> &BoardConfig {
        &self.settings
    }

    #[inline]
    pub const fn control_state(&self) -> ControlState {
        self.control_state
    }

    #[inline]
    pub const fn state_message(&self) -> StateMessage {
        self.state_message
    }

    #[inline]
    pub const fn requests(&self) -> EnableRequests {
        self.requests
    }

    #[inline]
    pub const fn reset_active(&self) -> bool {
        self.reset_active
    }

    #[inline]
    pub const fn ethernet_reset_cmd(&self) -> bool {
        self.ethernet_reset_cmd
    }

    #[inline]
    pub const fn permissions(&self) -> CommandPermissions {
        self.permissions
    }

    #[inline]
    pub const fn previous_customer_hv_on(&self) -> bool {
        self.previous_customer_hv_on
    }

    /// Ticks since start-up, wrapping.
    #[inline]
    pub const fn run_time_counter(&self) -> u16 {
        self.run_time_counter
    }

    #[inline]
    pub const fn timers(&self) -> &Timers {
        &self.timers
    }

    #[inline]
    pub const fn heater(&self) -> HeaterControl {
        self.heater
    }

    #[inline]
    pub const fn watchdog(&self) -> &SpiWatchdog {
        &self.watchdog
    }

    #[inline]
    pub const fn inputs(&self) -> &MonitoredInputs {
        &self.inputs
    }

    #[inline]
    pub const fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    #[inline]
    pub const fn dac_digital(&self) -> DacDigital {
        self.dac_digital
    }

    #[inline]
    pub const fn fpga(&self) -> &FpgaInputs {
        &self.fpga
    }

    #[inline]
    pub const fn adc_digital(&self) -> &AdcDigitalInputs {
        &self.adc_digital
    }

    #[inline]
    pub const fn discrete(&self) -> &DiscretePins {
        &self.discrete
    }

    #[inline]
    pub const fn faults(&self) -> FaultRegister {
        self.faults
    }

    #[inline]
    pub const fn warnings(&self) -> WarningRegister {
        self.warnings
    }

    /// Modbus tables as of the last refresh.
    #[inline]
    pub const fn shadow(&self) -> &ModbusTables {
        &self.shadow
    }

    #[inline]
    pub const fn adc_errors(&self) -> &AdcErrorTracker {
        &self.adc_errors
    }

    #[inline]
    pub const fn dac_errors(&self) -> &DacWriteTracker {
        &self.dac_errors
    }

    #[inline]
    pub const fn references(&self) -> &References {
        &self.references
    }

    pub fn control_config(&self) -> ConfigReceived {
        self.control_config.load()
    }

    /// Code due on `channel` this tick.
    pub fn dac_code(&self, channel: DacChannel) -> u16 {
        let o = &self.outputs;
        let d = &self.dac_digital;
        match channel {
            DacChannel::HighVoltage => o.high_voltage.dac_code(),
            DacChannel::TopVoltage => o.top_voltage.dac_code(),
            DacChannel::HeaterVoltage => o.heater_voltage.dac_code(),
            DacChannel::HvEnable => d.hv_enable,
            DacChannel::HeaterEnable => d.heater_enable,
            DacChannel::TopEnable => d.top_enable,
            DacChannel::TriggerEnable => d.trigger_enable,
            DacChannel::WatchdogOscillator => d.watchdog_oscillator,
            DacChannel::MonitorHeaterVoltage => o.monitor_heater_voltage.dac_code(),
            DacChannel::MonitorHeaterCurrent => o.monitor_heater_current.dac_code(),
            DacChannel::MonitorCathodeVoltage => o.monitor_cathode_voltage.dac_code(),
            DacChannel::MonitorGridVoltage => o.monitor_grid_voltage.dac_code(),
        }
    }
}

// ─── SharedControlState ─────────────────────────────────────────────

/// The state record behind a mutex, plus the lock-free `control_config`.
#[derive(Debug)]
pub struct SharedControlState {
    inner: Mutex<GlobalControlState>,
    control_config: ControlConfig,
}

impl SharedControlState {
    pub fn new(state: GlobalControlState) -> Self {
        let control_config = state.control_config.clone();
        Self {
            inner: Mutex::new(state),
            control_config,
        }
    }

    /// Lock the record. A panic in another holder does not make the state
    /// unreadable; the guard is recovered.
    pub fn lock(&self) -> MutexGuard<'_, GlobalControlState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// CAN set-points received, without taking the lock.
    #[inline]
    pub fn control_config(&self) -> ConfigReceived {
        self.control_config.load()
    }
}
