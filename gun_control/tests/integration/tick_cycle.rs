//! Tick runner against the simulated board: regulation, trips, reset.

use gun_common::consts::{DAC_DIGITAL_OFF, DAC_DIGITAL_ON};
use gun_common::gun::config::BoardConfig;
use gun_common::gun::digital::{AdcDigitalLines, FpgaReadout, FpgaStatus};
use gun_common::gun::fault::{Fault, Warning};
use gun_common::gun::interface::ControlSource;
use gun_control::board::DacChannel;
use gun_control::board::DiscreteInputs;
use gun_control::board::simulation::{SimOutput, SimulationBoard};
use gun_control::command::{Command, Reference};
use gun_control::state::HeaterPhase;
use gun_control::tick::TickRunner;

use super::{runner, ticks};

const HV_SET_POINT: u16 = 15_000;

fn hv_on(runner: &TickRunner<SimulationBoard>) {
    let mut state = runner.shared().lock();
    let mut command = state.command();
    command
        .apply(
            ControlSource::Ethernet,
            Command::SetPoint(Reference::HighVoltage, HV_SET_POINT),
        )
        .unwrap();
    command.apply(ControlSource::Ethernet, Command::HvEnable(true)).unwrap();
}

#[test]
fn hv_regulates_without_faults() {
    let mut r = runner(&BoardConfig::default());
    hv_on(&r);
    ticks(&mut r, 600);

    let state = r.shared().lock();
    assert!(state.faults().is_empty(), "faults: {:?}", state.faults());
    let hv = state.inputs().hv_v_mon.value();
    assert!(hv.abs_diff(HV_SET_POINT) < 100, "hv_v_mon = {hv}");
    drop(state);

    assert_eq!(r.board().dac_code(DacChannel::HvEnable), DAC_DIGITAL_ON);
    assert_eq!(r.board().dac_code(DacChannel::TopEnable), DAC_DIGITAL_ON);
    assert_eq!(r.board().dac_code(DacChannel::TriggerEnable), DAC_DIGITAL_OFF);
    assert_eq!(r.board().dac_code(DacChannel::HighVoltage), 45_000);
}

#[test]
fn hv_gain_skew_trips_relative_fault_and_drops_hv() {
    let mut r = runner(&BoardConfig::default());
    r.board_mut().set_gain(SimOutput::HighVoltage, 0.5);
    hv_on(&r);

    // Interlock debounce plus 500 strict trip counts.
    ticks(&mut r, 300);
    assert!(r.shared().lock().faults().is_empty());
    ticks(&mut r, 300);

    let state = r.shared().lock();
    assert!(state.faults().is_set(Fault::HvVMonUnderRelative));
    assert!(!state.faults().is_set(Fault::HvVMonOverRelative));
    assert!(!state.outputs().high_voltage.enabled());
    drop(state);
    assert_eq!(r.board().dac_code(DacChannel::HvEnable), DAC_DIGITAL_OFF);
    assert_eq!(r.board().dac_code(DacChannel::HighVoltage), DAC_DIGITAL_OFF);
}

#[test]
fn reset_clears_fault_and_hv_returns() {
    let mut r = runner(&BoardConfig::default());
    r.board_mut().set_gain(SimOutput::HighVoltage, 0.5);
    hv_on(&r);
    ticks(&mut r, 600);
    assert!(r.shared().lock().faults().is_set(Fault::HvVMonUnderRelative));

    r.board_mut().set_gain(SimOutput::HighVoltage, 1.0);
    r.shared()
        .lock()
        .command()
        .apply(ControlSource::Ethernet, Command::Reset)
        .unwrap();
    r.tick();
    {
        let state = r.shared().lock();
        assert!(state.faults().is_empty());
        assert!(!state.reset_active());
        assert!(!state.ethernet_reset_cmd());
    }
    ticks(&mut r, 600);
    assert!(r.shared().lock().faults().is_empty());
    assert_eq!(r.board().dac_code(DacChannel::HvEnable), DAC_DIGITAL_ON);
}

#[test]
fn open_interlock_inhibits_hv_only() {
    let mut r = runner(&BoardConfig::default());
    r.board_mut().set_discrete(DiscreteInputs {
        customer_hv_on: false,
        customer_beam_enable: false,
        interlock_relay_closed: false,
    });
    hv_on(&r);
    r.shared()
        .lock()
        .command()
        .apply(ControlSource::Ethernet, Command::HeaterEnable(true))
        .unwrap();
    ticks(&mut r, 10);

    let state = r.shared().lock();
    assert!(state.warnings().is_set(Warning::InterlockInhibitingHv));
    assert!(!state.outputs().high_voltage.enabled());
    assert!(state.outputs().heater_voltage.enabled());
}

fn heater_on(runner: &TickRunner<SimulationBoard>, target: u16) {
    let mut state = runner.shared().lock();
    let mut command = state.command();
    command
        .apply(ControlSource::Ethernet, Command::SetPoint(Reference::Heater, target))
        .unwrap();
    command
        .apply(ControlSource::Ethernet, Command::HeaterEnable(true))
        .unwrap();
}

/// Ramp of 100 mV per tick.
fn fast_ramp() -> BoardConfig {
    let mut config = BoardConfig::default();
    config.timing.heater_ramp_up_time_period = 1;
    config.control.heater_ramp_up_increment = 100;
    config
}

#[test]
fn heater_ramps_to_target_and_regulates() {
    let mut r = runner(&fast_ramp());
    heater_on(&r, 6_000);
    ticks(&mut r, 30);
    {
        let state = r.shared().lock();
        assert_eq!(state.heater().phase, HeaterPhase::RampUp);
        assert_eq!(state.outputs().heater_voltage.value(), 3_000);
        assert_eq!(state.heater().voltage_target, 6_000);
    }
    ticks(&mut r, 40);

    let state = r.shared().lock();
    assert_eq!(state.heater().phase, HeaterPhase::Regulating);
    assert_eq!(state.outputs().heater_voltage.value(), 6_000);
    assert!(state.faults().is_empty(), "faults: {:?}", state.faults());
    let current = state.inputs().htr_i_mon.value();
    assert!(current.abs_diff(1_200) < 10, "htr_i_mon = {current}");
}

#[test]
fn current_limited_ramp_times_out() {
    let mut config = fast_ramp();
    config.timing.max_heater_ramp_up_time = 200;
    let mut r = runner(&config);
    heater_on(&r, 8_000);
    ticks(&mut r, 150);
    {
        let state = r.shared().lock();
        let output = state.outputs().heater_voltage.value();
        assert!((7_000..8_000).contains(&output), "held at {output}");
        assert!(state.faults().is_empty());
    }
    ticks(&mut r, 60);

    let state = r.shared().lock();
    assert!(state.faults().is_set(Fault::HeaterRampTimeout));
    assert_eq!(state.heater().phase, HeaterPhase::Off);
    assert!(!state.outputs().heater_voltage.enabled());
}

#[test]
fn current_limited_heater_latches_fault() {
    let mut config = fast_ramp();
    config.timing.heater_voltage_current_limited_fault_time = 50;
    config.timing.current_limited_fault_holdoff_time = 0;
    let mut r = runner(&config);
    heater_on(&r, 6_000);
    ticks(&mut r, 70);
    assert_eq!(r.shared().lock().heater().phase, HeaterPhase::Regulating);

    r.board_mut().set_gain(SimOutput::Heater, 1.5);
    ticks(&mut r, 30);
    {
        let state = r.shared().lock();
        assert!(state.faults().is_empty());
        assert!(state.outputs().heater_voltage.value() < 6_000, "backing off");
    }
    ticks(&mut r, 30);

    let state = r.shared().lock();
    assert!(state.faults().is_set(Fault::HeaterVoltageCurrentLimited));
    assert!(!state.faults().is_set(Fault::HtrIMonOverAbsolute));
    assert!(!state.outputs().heater_voltage.enabled());
    drop(state);
    assert_eq!(r.board().dac_code(DacChannel::HeaterEnable), DAC_DIGITAL_OFF);
}

#[test]
fn adc_errors_are_leaky() {
    let mut r = runner(&BoardConfig::default());
    r.board_mut().fail_adc_reads(20);
    ticks(&mut r, 20);
    assert_eq!(r.shared().lock().adc_errors().error_test(), 20);

    // Good scans drain the test counter, so a later burst of 20 is tolerated.
    ticks(&mut r, 20);
    assert_eq!(r.shared().lock().adc_errors().error_test(), 0);
    r.board_mut().fail_adc_reads(20);
    ticks(&mut r, 20);
    {
        let state = r.shared().lock();
        assert!(!state.faults().is_set(Fault::SpiCommunication));
        assert_eq!(state.adc_errors().error_count(), 40);
    }

    // Half-drained: 10 good scans leave 10, and 11 more failures trip.
    ticks(&mut r, 10);
    r.board_mut().fail_adc_reads(11);
    ticks(&mut r, 10);
    assert!(!r.shared().lock().faults().is_set(Fault::SpiCommunication));
    r.tick();
    assert!(r.shared().lock().faults().is_set(Fault::SpiCommunication));
}

#[test]
fn digital_lines_latch_faults_and_warnings() {
    let mut r = runner(&BoardConfig::default());
    r.board_mut().set_adc_digital(AdcDigitalLines::ARC | AdcDigitalLines::WARMUP);
    r.board_mut()
        .set_fpga(FpgaReadout::matching(FpgaStatus::PRF_FAULT | FpgaStatus::DIPSWITCH_1_ON));
    r.tick();
    {
        let state = r.shared().lock();
        assert!(state.faults().is_set(Fault::AdcDigitalArc));
        assert!(state.faults().is_set(Fault::FpgaPrf));
        assert!(state.warnings().is_set(Warning::AdcDigitalHeaterNotReady));
        assert!(state.warnings().is_set(Warning::FpgaDipswitch1On));
    }

    // Lines clear: warnings follow, faults stay latched.
    r.board_mut().set_adc_digital(AdcDigitalLines::empty());
    r.board_mut().set_fpga(FpgaReadout::matching(FpgaStatus::empty()));
    r.tick();
    let state = r.shared().lock();
    assert!(state.faults().is_set(Fault::AdcDigitalArc));
    assert!(state.faults().is_set(Fault::FpgaPrf));
    assert!(!state.warnings().is_set(Warning::AdcDigitalHeaterNotReady));
    assert!(!state.warnings().is_set(Warning::FpgaDipswitch1On));
}

#[test]
fn dac_failure_is_counted_per_channel() {
    let mut r = runner(&BoardConfig::default());
    let attempts = usize::from(BoardConfig::default().control.max_dac_tx_attempts);
    // Two channels fail outright, the third succeeds on its last attempt.
    r.board_mut().fail_dac_writes((3 * attempts - 1) as u32);
    r.tick();
    {
        let state = r.shared().lock();
        assert_eq!(state.dac_errors().failure_count(), 2);
        assert_eq!(usize::from(state.dac_errors().error_count()), 3 * attempts - 1);
        assert!(state.warnings().is_set(Warning::DacWriteFailure));
    }
    r.tick();
    assert!(!r.shared().lock().warnings().is_set(Warning::DacWriteFailure));
}
