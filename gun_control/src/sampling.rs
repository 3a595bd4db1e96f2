//! Sampling path: raw board data into the state record.
//!
//! The only writer of monitored inputs, digital status, the ADC error
//! tracker and the warning register. Trips and digital fault lines latch
//! faults; they are never cleared here.

use gun_common::gun::analog::TripResult;
use gun_common::gun::digital::{AdcDigitalLines, FpgaReadout, FpgaStatus};
use gun_common::gun::fault::{Fault, Warning, WarningRegister};
use tracing::warn;

use crate::board::{AdcFrame, DiscreteInputs, InternalAdcSample};
use crate::control::latch;
use crate::state::{GlobalControlState, HeaterPhase};

/// ADC digital line → fault.
const ADC_LINE_FAULTS: [(AdcDigitalLines, Fault); 4] = [
    (AdcDigitalLines::ARC, Fault::AdcDigitalArc),
    (AdcDigitalLines::OVER_TEMP, Fault::AdcDigitalOverTemp),
    (AdcDigitalLines::GRID, Fault::AdcDigitalGrid),
    (AdcDigitalLines::WATCHDOG, Fault::SpiCommunication),
];

/// FPGA status line → fault.
const FPGA_FAULTS: [(FpgaStatus, Fault); 3] = [
    (FpgaStatus::FIRMWARE_MAJOR_REV_MISMATCH, Fault::FpgaFirmwareMajorRevMismatch),
    (FpgaStatus::PRF_FAULT, Fault::FpgaPrf),
    (
        FpgaStatus::CURRENT_MONITOR_PULSE_WIDTH_FAULT,
        Fault::FpgaCurrentMonitorPulseWidth,
    ),
];

/// FPGA status line → warning.
const FPGA_WARNINGS: [(FpgaStatus, Warning); 12] = [
    (FpgaStatus::ARC, Warning::FpgaArcCounterGreaterZero),
    (
        FpgaStatus::ARC_HIGH_VOLTAGE_INHIBIT_ACTIVE,
        Warning::FpgaArcHighVoltageInhibitActive,
    ),
    (FpgaStatus::MODULE_TEMP_GREATER_THAN_75C, Warning::FpgaModuleTempGreaterThan75C),
    (FpgaStatus::PULSE_WIDTH_LIMITING_ACTIVE, Warning::FpgaPulseWidthLimiting),
    (FpgaStatus::GRID_MODULE_HARDWARE_FAULT, Warning::FpgaGridModuleHardwareFault),
    (FpgaStatus::GRID_MODULE_OVER_VOLTAGE_FAULT, Warning::FpgaGridModuleOverVoltage),
    (FpgaStatus::GRID_MODULE_UNDER_VOLTAGE_FAULT, Warning::FpgaGridModuleUnderVoltage),
    (FpgaStatus::GRID_MODULE_BIAS_VOLTAGE_FAULT, Warning::FpgaGridModuleBiasVoltage),
    (FpgaStatus::HV_REGULATION_WARNING, Warning::FpgaHvRegulationWarning),
    (FpgaStatus::DIPSWITCH_1_ON, Warning::FpgaDipswitch1On),
    (
        FpgaStatus::TEST_MODE_TOGGLE_SWITCH_SET_TO_TEST,
        Warning::FpgaTestModeToggleSwitchTestMode,
    ),
    (
        FpgaStatus::LOCAL_MODE_TOGGLE_SWITCH_SET_TO_LOCAL,
        Warning::FpgaLocalModeToggleSwitchLocalMode,
    ),
];

/// Writer view for the sampling role.
pub struct SamplingPath<'a> {
    state: &'a mut GlobalControlState,
}

impl<'a> SamplingPath<'a> {
    pub(crate) fn new(state: &'a mut GlobalControlState) -> Self {
        Self { state }
    }

    /// Rescale one ADC scan and filter its digital lines.
    pub fn apply_adc(&mut self, frame: &AdcFrame) {
        let i = &mut self.state.inputs;
        i.adc_temperature.update(frame.adc_temperature);
        i.hv_v_mon.update(frame.hv_v_mon);
        i.hv_i_mon.update(frame.hv_i_mon);
        i.gun_i_peak.update(frame.gun_i_peak);
        i.htr_v_mon.update(frame.htr_v_mon);
        i.htr_i_mon.update(frame.htr_i_mon);
        i.top_v_mon.update(frame.top_v_mon);
        i.bias_v_mon.update(frame.bias_v_mon);
        i.v24_mon.update(frame.v24_mon);
        i.temperature_mon.update(frame.temperature_mon);
        i.dac_monitor.update(frame.dac_monitor);
        self.state
            .adc_digital
            .update(AdcDigitalLines::from_codes(frame.digital));
    }

    /// Count one ADC read outcome. Latches `SpiCommunication` once the leaky
    /// error count is strictly above the configured maximum.
    pub fn record_adc_read(&mut self, ok: bool) -> bool {
        let max = self.state.settings.control.max_converter_logic_adc_read_errors;
        let tripped = self.state.adc_errors.record(ok, max);
        if tripped && latch(self.state, Fault::SpiCommunication) {
            warn!(
                errors = self.state.adc_errors.error_count(),
                "converter-logic ADC read errors over limit"
            );
        }
        tripped
    }

    pub fn apply_fpga(&mut self, readout: FpgaReadout) {
        self.state.fpga.update(readout);
    }

    /// Accumulate the internal rails; each updates once per averaging window.
    pub fn apply_internal(&mut self, sample: InternalAdcSample) {
        let window = self.state.settings.internal_adc.average_samples;
        let i = &mut self.state.inputs;
        i.pos_5v.accumulate(sample.pos_5v, window);
        i.pos_15v.accumulate(sample.pos_15v, window);
        i.neg_15v.accumulate(sample.neg_15v, window);
    }

    pub fn apply_discrete(&mut self, pins: DiscreteInputs) {
        let d = &mut self.state.discrete;
        d.customer_hv_on.update(pins.customer_hv_on);
        d.customer_beam_enable.update(pins.customer_beam_enable);
        d.interlock_relay_closed.update(pins.interlock_relay_closed);
    }

    /// Relative and absolute trips.
    ///
    /// Relative targets are the current output set-points; the check only
    /// runs while the output is enabled. Heater current is checked while the
    /// heater is on, and its under limit arms once the heater has reached its
    /// target. Bias is checked only while HV is on.
    pub fn check_trips(&mut self) {
        let s = &mut *self.state;
        let o = &s.outputs;
        let i = &mut s.inputs;
        i.hv_v_mon.set_target(o.high_voltage.value());
        i.htr_v_mon.set_target(o.heater_voltage.value());
        i.top_v_mon.set_target(o.top_voltage.value());

        let hv = i.hv_v_mon.check_relative(o.high_voltage.enabled());
        let htr_v = i.htr_v_mon.check_relative(o.heater_voltage.enabled());
        let top = i.top_v_mon.check_relative(o.top_voltage.enabled());

        let htr_i = if !o.heater_voltage.enabled() {
            i.htr_i_mon.reset_trips();
            TripResult::default()
        } else if s.heater.phase == HeaterPhase::Regulating {
            i.htr_i_mon.check_absolute()
        } else {
            i.htr_i_mon.check_absolute_over()
        };

        let bias = if o.high_voltage.enabled() {
            i.bias_v_mon.check_absolute()
        } else {
            i.bias_v_mon.reset_trips();
            TripResult::default()
        };

        let tripped = [
            (hv.over, Fault::HvVMonOverRelative),
            (hv.under, Fault::HvVMonUnderRelative),
            (htr_v.over, Fault::HtrVMonOverRelative),
            (htr_v.under, Fault::HtrVMonUnderRelative),
            (top.over, Fault::TopVMonOverRelative),
            (top.under, Fault::TopVMonUnderRelative),
            (htr_i.over, Fault::HtrIMonOverAbsolute),
            (htr_i.under, Fault::HtrIMonUnderAbsolute),
            (bias.over, Fault::BiasVMonOverAbsolute),
            (bias.under, Fault::BiasVMonUnderAbsolute),
        ];
        for (hit, fault) in tripped {
            if hit {
                latch(s, fault);
            }
        }
    }

    /// Latch faults reported by the ADC digital lines and the FPGA.
    pub fn check_digital_faults(&mut self) {
        let lines = self.state.adc_digital.lines();
        let fpga = self.state.fpga.status();
        for (line, fault) in ADC_LINE_FAULTS {
            if lines.contains(line) {
                latch(self.state, fault);
            }
        }
        for (line, fault) in FPGA_FAULTS {
            if fpga.contains(line) {
                latch(self.state, fault);
            }
        }
    }

    /// Recompute the warning register from live inputs.
    pub fn update_status(&mut self) {
        let s = &mut *self.state;
        let mut w = WarningRegister::empty();
        w.assign(Warning::CustomerHvOn, s.discrete.customer_hv_on());
        w.assign(Warning::CustomerBeamEnable, s.discrete.customer_beam_enable());
        w.assign(
            Warning::AdcDigitalHeaterNotReady,
            s.adc_digital.lines().contains(AdcDigitalLines::WARMUP),
        );
        w.assign(Warning::DacWriteFailure, s.dac_errors.failure());
        w.assign(
            Warning::InterlockInhibitingHv,
            !s.discrete.interlock_relay_closed(),
        );
        w.assign(Warning::ConverterLogicAdcReadFailure, !s.adc_errors.read_ok());
        w.assign(
            Warning::AdcDigitalPulseWidthDuty,
            s.adc_digital.lines().contains(AdcDigitalLines::PULSE_WIDTH_DUTY),
        );
        let fpga = s.fpga.status();
        for (line, warning) in FPGA_WARNINGS {
            if fpga.contains(line) {
                w.assign(warning, true);
            }
        }
        s.warnings = w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gun_common::gun::config::BoardConfig;

    fn state() -> GlobalControlState {
        GlobalControlState::new(&BoardConfig::default())
    }

    #[test]
    fn twenty_read_errors_hold_twenty_first_latches() {
        let mut s = state();
        for _ in 0..20 {
            assert!(!s.sampling().record_adc_read(false));
        }
        assert!(s.faults().is_empty());
        assert!(s.sampling().record_adc_read(false));
        assert!(s.faults().is_set(Fault::SpiCommunication));
    }

    #[test]
    fn adc_frame_scales_inputs() {
        let mut s = state();
        let frame = AdcFrame {
            hv_v_mon: 1000,
            ..AdcFrame::default()
        };
        s.sampling().apply_adc(&frame);
        let expected = BoardConfig::default()
            .adc
            .hv_v_mon
            .calibration
            .to_engineering(1000);
        assert_eq!(s.inputs().hv_v_mon.value(), expected);
        assert_eq!(s.inputs().hv_v_mon.raw(), 1000);
    }

    #[test]
    fn relative_trip_needs_enabled_output() {
        let mut s = state();
        s.outputs.high_voltage.set_point(10_000).unwrap();
        for _ in 0..1000 {
            s.sampling().check_trips();
        }
        assert!(s.faults().is_empty(), "disabled output never trips");

        s.outputs.high_voltage.set_enabled(true);
        let count = BoardConfig::default()
            .adc
            .hv_v_mon
            .relative_trip
            .unwrap()
            .count;
        for _ in 0..count {
            s.sampling().check_trips();
        }
        assert!(!s.faults().is_set(Fault::HvVMonUnderRelative));
        s.sampling().check_trips();
        assert!(s.faults().is_set(Fault::HvVMonUnderRelative));
    }

    fn htr_i_count() -> u16 {
        BoardConfig::default()
            .adc
            .htr_i_mon
            .absolute_trip
            .unwrap()
            .count
    }

    #[test]
    fn open_heater_trips_once_at_target() {
        let mut s = state();
        s.outputs.heater_voltage.set_enabled(true);
        s.heater.phase = HeaterPhase::Regulating;
        s.inputs.htr_i_mon.update(0);
        for _ in 0..htr_i_count() {
            s.sampling().check_trips();
        }
        assert!(s.faults().is_empty());
        s.sampling().check_trips();
        assert!(s.faults().is_set(Fault::HtrIMonUnderAbsolute));
        assert_eq!(s.faults().bits() & (1 << 4), 1 << 4);
    }

    #[test]
    fn heater_current_under_limit_waits_for_the_heater() {
        let mut s = state();
        s.inputs.htr_i_mon.update(0);
        for _ in 0..1000 {
            s.sampling().check_trips();
        }
        assert!(s.faults().is_empty(), "heater off");

        s.outputs.heater_voltage.set_enabled(true);
        s.heater.phase = HeaterPhase::RampUp;
        for _ in 0..1000 {
            s.sampling().check_trips();
        }
        assert!(s.faults().is_empty(), "still ramping");

        s.inputs.htr_i_mon.update(u16::MAX);
        for _ in 0..=htr_i_count() {
            s.sampling().check_trips();
        }
        assert!(s.faults().is_set(Fault::HtrIMonOverAbsolute));
    }

    #[test]
    fn digital_lines_latch_faults() {
        let mut s = state();
        let mut frame = AdcFrame::default();
        frame.digital[2] = 0x0FFF; // arc
        s.sampling().apply_adc(&frame);
        s.sampling().check_digital_faults();
        assert!(s.faults().is_set(Fault::AdcDigitalArc));

        let mut readout = FpgaReadout::matching(FpgaStatus::PRF_FAULT);
        readout.firmware_major_rev ^= 0x0F;
        s.sampling().apply_fpga(readout);
        s.sampling().check_digital_faults();
        assert!(s.faults().is_set(Fault::FpgaPrf));
        assert!(s.faults().is_set(Fault::FpgaFirmwareMajorRevMismatch));
    }

    #[test]
    fn status_is_recomputed_each_time() {
        let mut s = state();
        s.sampling().apply_fpga(FpgaReadout::matching(
            FpgaStatus::ARC | FpgaStatus::GRID_MODULE_UNDER_VOLTAGE_FAULT,
        ));
        s.sampling().update_status();
        assert!(s.warnings().is_set(Warning::FpgaArcCounterGreaterZero));
        assert!(s.warnings().is_set(Warning::FpgaGridModuleOverVoltage), "shared bit");
        assert!(s.warnings().is_set(Warning::InterlockInhibitingHv));

        s.sampling().apply_fpga(FpgaReadout::matching(FpgaStatus::empty()));
        for _ in 0..3 {
            s.sampling().apply_discrete(DiscreteInputs {
                interlock_relay_closed: true,
                ..DiscreteInputs::default()
            });
        }
        s.sampling().update_status();
        assert!(!s.warnings().is_set(Warning::FpgaArcCounterGreaterZero));
        assert!(!s.warnings().is_set(Warning::InterlockInhibitingHv));
    }

    #[test]
    fn internal_rails_average_over_window() {
        let mut config = BoardConfig::default();
        config.internal_adc.average_samples = 4;
        let mut s = GlobalControlState::new(&config);
        for raw in [100, 200, 300] {
            s.sampling().apply_internal(InternalAdcSample {
                pos_5v: raw,
                pos_15v: raw,
                neg_15v: raw,
            });
        }
        assert_eq!(s.inputs().pos_5v.raw(), 0);
        s.sampling().apply_internal(InternalAdcSample {
            pos_5v: 400,
            pos_15v: 400,
            neg_15v: 400,
        });
        assert_eq!(s.inputs().pos_5v.raw(), 250);
    }
}
