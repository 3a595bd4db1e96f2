//! Control-state register map.
//!
//! The shadow tables are rebuilt from the state record once per tick and
//! after every accepted write. Reads are served from the tables while the
//! connection's source may monitor; writes go through the command path with
//! that source.
//!
//! Layout:
//!
//! | Table | Index | Content |
//! |---|---|---|
//! | input | 0..=3 | state message, control state, fault register, warning register |
//! | input | 4..=13 | engineering values (see [`input`]) |
//! | input | 14..=16 | HV / top / heater set-points |
//! | input | 17..=20 | run time, ADC errors, DAC errors, DAC failures |
//! | input | 21..=23 | +5 V, +15 V, −15 V rails |
//! | input | 24..=27 | control_config, FPGA status low/high, output enables |
//! | holding | 0..=2 | heater target / top / HV references (read-write) |
//! | bits | 0..=3 | heater / HV / beam enable requests, reset (read-write) |
//! | bits | 16..=31 | fault register bits (read-only) |
//! | bits | 32..=47 | warning register bits (read-only) |

use bitflags::bitflags;
use gun_common::gun::interface::ControlSource;
use gun_common::modbus::consts::{
    ExceptionCode, SLAVE_BIT_ARRAY_SIZE, SLAVE_HOLD_REG_ARRAY_SIZE, SLAVE_INPUT_REG_ARRAY_SIZE,
};
use static_assertions::const_assert;

use super::map::{ModbusTables, RegisterMap};
use crate::command::{Command, CommandError, Reference};
use crate::state::GlobalControlState;

/// Input register indices.
pub mod input {
    pub const STATE_MESSAGE: u16 = 0;
    pub const CONTROL_STATE: u16 = 1;
    pub const FAULTS: u16 = 2;
    pub const WARNINGS: u16 = 3;
    pub const HV_V_MON: u16 = 4;
    pub const HV_I_MON: u16 = 5;
    pub const GUN_I_PEAK: u16 = 6;
    pub const HTR_V_MON: u16 = 7;
    pub const HTR_I_MON: u16 = 8;
    pub const TOP_V_MON: u16 = 9;
    pub const BIAS_V_MON: u16 = 10;
    pub const V24_MON: u16 = 11;
    pub const TEMPERATURE_MON: u16 = 12;
    pub const ADC_TEMPERATURE: u16 = 13;
    pub const HV_SET_POINT: u16 = 14;
    pub const TOP_SET_POINT: u16 = 15;
    pub const HEATER_SET_POINT: u16 = 16;
    pub const RUN_TIME: u16 = 17;
    pub const ADC_ERRORS: u16 = 18;
    pub const DAC_ERRORS: u16 = 19;
    pub const DAC_FAILURES: u16 = 20;
    pub const POS_5V: u16 = 21;
    pub const POS_15V: u16 = 22;
    pub const NEG_15V: u16 = 23;
    pub const CONTROL_CONFIG: u16 = 24;
    pub const FPGA_STATUS_LOW: u16 = 25;
    pub const FPGA_STATUS_HIGH: u16 = 26;
    pub const OUTPUT_ENABLES: u16 = 27;
    /// First unused index.
    pub const END: u16 = 28;
}

/// Holding register indices.
pub mod holding {
    pub const HEATER_REFERENCE: u16 = 0;
    pub const TOP_REFERENCE: u16 = 1;
    pub const HV_REFERENCE: u16 = 2;
    pub const END: u16 = 3;
}

/// Bit indices.
pub mod bits {
    pub const HEATER_ENABLE: u16 = 0;
    pub const HV_ENABLE: u16 = 1;
    pub const BEAM_ENABLE: u16 = 2;
    pub const RESET: u16 = 3;
    /// Fault register bit 0; bits 0..=15 follow.
    pub const FAULTS: u16 = 16;
    /// Warning register bit 0; bits 0..=15 follow.
    pub const WARNINGS: u16 = 32;
    pub const END: u16 = WARNINGS + 16;
}

const_assert!(input::END as usize <= SLAVE_INPUT_REG_ARRAY_SIZE);
const_assert!(holding::END as usize <= SLAVE_HOLD_REG_ARRAY_SIZE);
const_assert!(bits::END as usize <= SLAVE_BIT_ARRAY_SIZE);

bitflags! {
    /// Input register [`input::OUTPUT_ENABLES`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OutputEnables: u16 {
        const HEATER       = 1 << 0;
        const HIGH_VOLTAGE = 1 << 1;
        const TOP          = 1 << 2;
        const TRIGGER      = 1 << 3;
    }
}

/// Rebuild the shadow tables from the state record.
pub fn refresh(state: &mut GlobalControlState) {
    let mut t = ModbusTables::default();
    let i = state.inputs();
    let o = state.outputs();

    let mut enables = OutputEnables::empty();
    enables.set(OutputEnables::HEATER, o.heater_voltage.enabled());
    enables.set(OutputEnables::HIGH_VOLTAGE, o.high_voltage.enabled());
    enables.set(OutputEnables::TOP, o.top_voltage.enabled());
    enables.set(
        OutputEnables::TRIGGER,
        state.dac_digital().trigger_enable == gun_common::consts::DAC_DIGITAL_ON,
    );
    let fpga = state.fpga().status().bits();

    for (index, value) in [
        (input::STATE_MESSAGE, state.state_message().code()),
        (input::CONTROL_STATE, state.control_state().code()),
        (input::FAULTS, state.faults().bits()),
        (input::WARNINGS, state.warnings().bits()),
        (input::HV_V_MON, i.hv_v_mon.value()),
        (input::HV_I_MON, i.hv_i_mon.value()),
        (input::GUN_I_PEAK, i.gun_i_peak.value()),
        (input::HTR_V_MON, i.htr_v_mon.value()),
        (input::HTR_I_MON, i.htr_i_mon.value()),
        (input::TOP_V_MON, i.top_v_mon.value()),
        (input::BIAS_V_MON, i.bias_v_mon.value()),
        (input::V24_MON, i.v24_mon.value()),
        (input::TEMPERATURE_MON, i.temperature_mon.value()),
        (input::ADC_TEMPERATURE, i.adc_temperature.value()),
        (input::HV_SET_POINT, o.high_voltage.value()),
        (input::TOP_SET_POINT, o.top_voltage.value()),
        (input::HEATER_SET_POINT, o.heater_voltage.value()),
        (input::RUN_TIME, state.run_time_counter()),
        (input::ADC_ERRORS, state.adc_errors().error_count()),
        (input::DAC_ERRORS, state.dac_errors().error_count()),
        (input::DAC_FAILURES, state.dac_errors().failure_count()),
        (input::POS_5V, i.pos_5v.value()),
        (input::POS_15V, i.pos_15v.value()),
        (input::NEG_15V, i.neg_15v.value()),
        (input::CONTROL_CONFIG, u16::from(state.control_config().bits())),
        (input::FPGA_STATUS_LOW, (fpga & 0xFFFF) as u16),
        (input::FPGA_STATUS_HIGH, (fpga >> 16) as u16),
        (input::OUTPUT_ENABLES, enables.bits()),
    ] {
        t.input[usize::from(index)] = value;
    }

    t.holding[usize::from(holding::HEATER_REFERENCE)] = state.heater().voltage_target;
    t.holding[usize::from(holding::TOP_REFERENCE)] = o.top_voltage.value();
    t.holding[usize::from(holding::HV_REFERENCE)] = o.high_voltage.value();

    let requests = state.requests();
    t.bits[usize::from(bits::HEATER_ENABLE)] = requests.heater;
    t.bits[usize::from(bits::HV_ENABLE)] = requests.hv;
    t.bits[usize::from(bits::BEAM_ENABLE)] = requests.beam;
    t.bits[usize::from(bits::RESET)] = state.reset_active();
    let faults = state.faults().bits();
    let warnings = state.warnings().bits();
    for bit in 0..16u16 {
        t.bits[usize::from(bits::FAULTS + bit)] = faults & (1 << bit) != 0;
        t.bits[usize::from(bits::WARNINGS + bit)] = warnings & (1 << bit) != 0;
    }

    state.shadow = t;
}

/// Exception sent back for a rejected command.
pub const fn exception_for(error: &CommandError) -> ExceptionCode {
    match error {
        CommandError::ControlNotPermitted { .. } | CommandError::ReferenceNotPermitted { .. } => {
            ExceptionCode::DeviceFailure
        }
        CommandError::OutOfRange { .. } => ExceptionCode::IllegalValue,
    }
}

/// Register map over the live state, for one connection's source.
pub struct ControlShadow<'a> {
    state: &'a mut GlobalControlState,
    source: ControlSource,
}

impl<'a> ControlShadow<'a> {
    pub fn new(state: &'a mut GlobalControlState, source: ControlSource) -> Self {
        Self { state, source }
    }

    fn tables(&self) -> Result<&ModbusTables, ExceptionCode> {
        if self.state.permissions.allows_monitor(self.source) {
            Ok(&self.state.shadow)
        } else {
            Err(ExceptionCode::DeviceFailure)
        }
    }

    fn submit(&mut self, command: Command) -> Result<(), ExceptionCode> {
        self.state
            .command()
            .apply(self.source, command)
            .map_err(|e| exception_for(&e))?;
        refresh(self.state);
        Ok(())
    }
}

impl RegisterMap for ControlShadow<'_> {
    fn read_bit(&self, address: u16) -> Result<bool, ExceptionCode> {
        self.tables()?.read_bit(address)
    }

    fn read_holding(&self, address: u16) -> Result<u16, ExceptionCode> {
        self.tables()?.read_holding(address)
    }

    fn read_input(&self, address: u16) -> Result<u16, ExceptionCode> {
        self.tables()?.read_input(address)
    }

    fn write_bit(&mut self, address: u16, value: bool) -> Result<(), ExceptionCode> {
        let command = match address {
            bits::HEATER_ENABLE => Command::HeaterEnable(value),
            bits::HV_ENABLE => Command::HvEnable(value),
            bits::BEAM_ENABLE => Command::BeamEnable(value),
            // Writing 0 to the reset bit is accepted and does nothing.
            bits::RESET if !value => return Ok(()),
            bits::RESET => Command::Reset,
            _ => return Err(ExceptionCode::IllegalAddress),
        };
        self.submit(command)
    }

    fn write_holding(&mut self, address: u16, value: u16) -> Result<(), ExceptionCode> {
        let reference = match address {
            holding::HEATER_REFERENCE => Reference::Heater,
            holding::TOP_REFERENCE => Reference::PulseTop,
            holding::HV_REFERENCE => Reference::HighVoltage,
            _ => return Err(ExceptionCode::IllegalAddress),
        };
        self.submit(Command::SetPoint(reference, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gun_common::gun::config::BoardConfig;
    use gun_common::gun::fault::{Fault, Warning};
    use gun_common::gun::interface::InterfaceModes;
    use gun_common::gun::state::{ControlState, StateMessage};

    fn state() -> GlobalControlState {
        GlobalControlState::new(&BoardConfig::default())
    }

    #[test]
    fn refresh_exposes_state_and_registers() {
        let mut s = state();
        s.control().set_state(ControlState::HvOn);
        s.control().latch_fault(Fault::TopVMonUnderRelative);
        s.warnings.assign(Warning::FpgaDipswitch1On, true);
        refresh(&mut s);

        let t = s.shadow();
        assert_eq!(t.input[input::STATE_MESSAGE as usize], StateMessage::HvOn.code());
        assert_eq!(t.input[input::CONTROL_STATE as usize], 120);
        assert_eq!(t.input[input::FAULTS as usize], 1 << 5);
        assert_eq!(t.input[input::WARNINGS as usize], 1 << 0xD);
        assert!(t.bits[(bits::FAULTS + 5) as usize]);
        assert!(t.bits[(bits::WARNINGS + 0xD) as usize]);
        assert!(!t.bits[(bits::FAULTS + 4) as usize]);
    }

    #[test]
    fn writes_route_through_command_path() {
        let mut s = state();
        let mut map = ControlShadow::new(&mut s, ControlSource::Ethernet);
        map.write_holding(holding::HV_REFERENCE, 12_000).unwrap();
        map.write_bit(bits::HV_ENABLE, true).unwrap();
        assert_eq!(map.read_holding(holding::HV_REFERENCE), Ok(12_000));
        assert_eq!(map.read_bit(bits::HV_ENABLE), Ok(true));
        assert_eq!(map.read_input(input::HV_SET_POINT), Ok(12_000));
        assert!(s.requests().hv);
        assert_eq!(s.references().ethernet.high_voltage, 12_000);
    }

    #[test]
    fn write_errors_map_to_exceptions() {
        let mut s = state();
        let mut map = ControlShadow::new(&mut s, ControlSource::Modbus);
        assert_eq!(
            map.write_bit(bits::HEATER_ENABLE, true),
            Err(ExceptionCode::DeviceFailure),
            "Modbus has no control permission by default"
        );
        drop(map);

        let mut map = ControlShadow::new(&mut s, ControlSource::Ethernet);
        assert_eq!(
            map.write_holding(holding::HEATER_REFERENCE, 9_000),
            Err(ExceptionCode::IllegalValue)
        );
        assert_eq!(map.write_holding(3, 1), Err(ExceptionCode::IllegalAddress));
        assert_eq!(
            map.write_bit(bits::FAULTS, false),
            Err(ExceptionCode::IllegalAddress),
            "fault bits are read-only"
        );
        assert_eq!(map.write_bit(64, true), Err(ExceptionCode::IllegalAddress));
    }

    #[test]
    fn reads_need_monitor_permission() {
        let config = BoardConfig {
            interface: InterfaceModes {
                modbus_monitor: false,
                ..InterfaceModes::default()
            },
            ..BoardConfig::default()
        };
        let mut s = GlobalControlState::new(&config);
        refresh(&mut s);
        let map = ControlShadow::new(&mut s, ControlSource::Modbus);
        assert_eq!(map.read_input(input::FAULTS), Err(ExceptionCode::DeviceFailure));
        assert_eq!(map.read_bit(bits::HV_ENABLE), Err(ExceptionCode::DeviceFailure));
        assert_eq!(
            map.read_holding(holding::HV_REFERENCE),
            Err(ExceptionCode::DeviceFailure)
        );

        let mut s = state();
        refresh(&mut s);
        let map = ControlShadow::new(&mut s, ControlSource::Modbus);
        assert_eq!(map.read_input(input::FAULTS), Ok(0), "monitor-only reads");
    }

    #[test]
    fn heater_reference_reads_back_the_target() {
        let mut s = state();
        let mut map = ControlShadow::new(&mut s, ControlSource::Ethernet);
        map.write_holding(holding::HEATER_REFERENCE, 6_000).unwrap();
        assert_eq!(map.read_holding(holding::HEATER_REFERENCE), Ok(6_000));
        assert_eq!(map.read_input(input::HEATER_SET_POINT), Ok(0), "output not ramped yet");
    }

    #[test]
    fn reset_bit_requests_reset() {
        let mut s = state();
        let mut map = ControlShadow::new(&mut s, ControlSource::Ethernet);
        map.write_bit(bits::RESET, false).unwrap();
        assert_eq!(map.read_bit(bits::RESET), Ok(false));
        map.write_bit(bits::RESET, true).unwrap();
        assert_eq!(map.read_bit(bits::RESET), Ok(true));
        assert!(s.ethernet_reset_cmd());
    }
}
