//! Simulated converter-logic board.
//!
//! Closes the loop in software: monitored voltages follow the DAC codes last
//! written (through the configured calibrations), the DAC-monitor channel
//! echoes the watchdog oscillator, and faults can be injected for tests.

use gun_common::consts::{ADC_DATA_DIGITAL_HIGH, DAC_DIGITAL_ON};
use gun_common::gun::analog::Calibration;
use gun_common::gun::config::{AdcCalibration, BoardConfig, DacCalibration, InternalAdcConfig};
use gun_common::gun::digital::{AdcDigitalLines, FpgaReadout, FpgaStatus};
use tracing::{debug, info};

use super::{AdcFrame, BoardError, ConverterBoard, DacChannel, DiscreteInputs, InternalAdcSample};

/// Heater load [mA per mV].
const HEATER_MA_PER_MV: f64 = 0.2;
/// Beam current per kV of cathode voltage [engineering units].
const HV_I_PER_V: f64 = 0.01;
/// Bias supply level while HV is on.
const BIAS_WHILE_HV_ON: u16 = 16_000;
const V24_MON_MV: u16 = 24_000;
const BOARD_TEMPERATURE: u16 = 2_500;

/// Regulated output whose plant gain can be skewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutput {
    HighVoltage,
    TopVoltage,
    Heater,
}

/// Inverse of the input calibration: the raw code that reads back as
/// `value` engineering units.
fn raw_for(calibration: &Calibration, value: f64) -> u16 {
    if calibration.scale <= 0.0 {
        return 0;
    }
    (value / calibration.scale + f64::from(calibration.offset)).round() as u16
}

fn output_level(calibration: &Calibration, code: u16) -> f64 {
    if calibration.scale <= 0.0 {
        return 0.0;
    }
    ((f64::from(code) - f64::from(calibration.offset)) / calibration.scale).max(0.0)
}

/// Software converter-logic board.
pub struct SimulationBoard {
    initialized: bool,
    adc: AdcCalibration,
    dac: DacCalibration,
    internal: InternalAdcConfig,
    dac_codes: [u16; DacChannel::COUNT],
    gains: [f64; 3],
    fpga: FpgaReadout,
    adc_digital: AdcDigitalLines,
    discrete: DiscreteInputs,
    failing_adc_reads: u32,
    failing_fpga_reads: u32,
    failing_dac_writes: u32,
    dac_writes: u64,
}

impl SimulationBoard {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            initialized: false,
            adc: config.adc,
            dac: config.dac,
            internal: config.internal_adc,
            dac_codes: [0; DacChannel::COUNT],
            gains: [1.0; 3],
            fpga: FpgaReadout::matching(FpgaStatus::empty()),
            adc_digital: AdcDigitalLines::empty(),
            discrete: DiscreteInputs {
                customer_hv_on: false,
                customer_beam_enable: false,
                interlock_relay_closed: true,
            },
            failing_adc_reads: 0,
            failing_fpga_reads: 0,
            failing_dac_writes: 0,
            dac_writes: 0,
        }
    }

    // ─── Fault injection ────────────────────────────────────────────

    /// The next `count` ADC scans fail.
    pub fn fail_adc_reads(&mut self, count: u32) {
        self.failing_adc_reads = count;
    }

    pub fn fail_fpga_reads(&mut self, count: u32) {
        self.failing_fpga_reads = count;
    }

    /// The next `count` DAC transmission attempts fail.
    pub fn fail_dac_writes(&mut self, count: u32) {
        self.failing_dac_writes = count;
    }

    /// Scale the measured level of `output` relative to its command.
    pub fn set_gain(&mut self, output: SimOutput, gain: f64) {
        self.gains[output as usize] = gain;
    }

    pub fn set_fpga(&mut self, readout: FpgaReadout) {
        self.fpga = readout;
    }

    pub fn set_adc_digital(&mut self, lines: AdcDigitalLines) {
        self.adc_digital = lines;
    }

    pub fn set_discrete(&mut self, inputs: DiscreteInputs) {
        self.discrete = inputs;
    }

    // ─── Inspection ─────────────────────────────────────────────────

    /// Last code written to `channel`.
    pub fn dac_code(&self, channel: DacChannel) -> u16 {
        self.dac_codes[channel.index()]
    }

    /// Successful DAC transmissions since creation.
    pub fn dac_writes(&self) -> u64 {
        self.dac_writes
    }

    fn enabled(&self, channel: DacChannel) -> bool {
        self.dac_code(channel) == DAC_DIGITAL_ON
    }

    fn level(&self, output: SimOutput, enable: DacChannel, set: DacChannel) -> f64 {
        if !self.enabled(enable) {
            return 0.0;
        }
        let calibration = match output {
            SimOutput::HighVoltage => &self.dac.high_voltage,
            SimOutput::TopVoltage => &self.dac.top_voltage,
            SimOutput::Heater => &self.dac.heater_voltage,
        };
        output_level(calibration, self.dac_code(set)) * self.gains[output as usize]
    }
}

impl ConverterBoard for SimulationBoard {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn init(&mut self) -> Result<(), BoardError> {
        self.initialized = true;
        info!("Simulation converter board initialised");
        Ok(())
    }

    fn read_adc(&mut self) -> Result<AdcFrame, BoardError> {
        if !self.initialized {
            return Err(BoardError::NotInitialized);
        }
        if self.failing_adc_reads > 0 {
            self.failing_adc_reads -= 1;
            return Err(BoardError::AdcRead("injected failure".to_string()));
        }

        let hv = self.level(SimOutput::HighVoltage, DacChannel::HvEnable, DacChannel::HighVoltage);
        let top = self.level(SimOutput::TopVoltage, DacChannel::TopEnable, DacChannel::TopVoltage);
        let heater = self.level(SimOutput::Heater, DacChannel::HeaterEnable, DacChannel::HeaterVoltage);
        let bias = if self.enabled(DacChannel::HvEnable) {
            f64::from(BIAS_WHILE_HV_ON)
        } else {
            0.0
        };

        let mut digital = [0u16; 6];
        for (code, flag) in digital.iter_mut().zip(AdcDigitalLines::all().iter()) {
            if self.adc_digital.contains(flag) {
                *code = ADC_DATA_DIGITAL_HIGH.saturating_mul(2);
            }
        }

        let a = &self.adc;
        Ok(AdcFrame {
            adc_temperature: raw_for(&a.adc_temperature.calibration, f64::from(BOARD_TEMPERATURE)),
            hv_v_mon: raw_for(&a.hv_v_mon.calibration, hv),
            hv_i_mon: raw_for(&a.hv_i_mon.calibration, hv * HV_I_PER_V),
            gun_i_peak: 0,
            htr_v_mon: raw_for(&a.htr_v_mon.calibration, heater),
            htr_i_mon: raw_for(&a.htr_i_mon.calibration, heater * HEATER_MA_PER_MV),
            top_v_mon: raw_for(&a.top_v_mon.calibration, top),
            bias_v_mon: raw_for(&a.bias_v_mon.calibration, bias),
            v24_mon: raw_for(&a.v24_mon.calibration, f64::from(V24_MON_MV)),
            temperature_mon: raw_for(
                &a.temperature_mon.calibration,
                f64::from(BOARD_TEMPERATURE),
            ),
            dac_monitor: self.dac_code(DacChannel::WatchdogOscillator),
            digital,
        })
    }

    fn read_fpga(&mut self) -> Result<FpgaReadout, BoardError> {
        if !self.initialized {
            return Err(BoardError::NotInitialized);
        }
        if self.failing_fpga_reads > 0 {
            self.failing_fpga_reads -= 1;
            return Err(BoardError::FpgaRead("injected failure".to_string()));
        }
        Ok(self.fpga)
    }

    fn read_internal_adc(&mut self) -> InternalAdcSample {
        InternalAdcSample {
            pos_5v: raw_for(&self.internal.pos_5v, 5_000.0),
            pos_15v: raw_for(&self.internal.pos_15v, 15_000.0),
            neg_15v: raw_for(&self.internal.neg_15v, 15_000.0),
        }
    }

    fn read_discrete(&mut self) -> DiscreteInputs {
        self.discrete
    }

    fn write_dac(&mut self, channel: DacChannel, code: u16) -> Result<(), BoardError> {
        if !self.initialized {
            return Err(BoardError::NotInitialized);
        }
        if self.failing_dac_writes > 0 {
            self.failing_dac_writes -= 1;
            return Err(BoardError::DacWrite {
                channel,
                reason: "injected failure".to_string(),
            });
        }
        self.dac_codes[channel.index()] = code;
        self.dac_writes += 1;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), BoardError> {
        debug!(writes = self.dac_writes, "Simulation converter board shut down");
        self.dac_codes = [0; DacChannel::COUNT];
        self.initialized = false;
        Ok(())
    }
}
