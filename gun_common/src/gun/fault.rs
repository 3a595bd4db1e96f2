//! Fault and warning registers.
//!
//! Each register is a 16-bit `bitflags` word with a fixed meaning per bit.
//! Code never addresses bits directly: conditions are named by [`Fault`] and
//! [`Warning`], and each maps to exactly one bit. Several conditions share a
//! bit on purpose (over/under pairs, arc counter/inhibit, grid over/under);
//! the register cannot tell them apart once latched.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

bitflags! {
    /// Fault register. Faults latch; only the control path clears them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FaultRegister: u16 {
        const FPGA_FIRMWARE_MAJOR_REV_MISMATCH = 1 << 0x0;
        const HV_V_MON_RELATIVE                = 1 << 0x1;
        const HTR_V_MON_RELATIVE               = 1 << 0x2;
        const HTR_I_MON_OVER_ABSOLUTE          = 1 << 0x3;
        const HTR_I_MON_UNDER_ABSOLUTE         = 1 << 0x4;
        const TOP_V_MON_RELATIVE               = 1 << 0x5;
        const BIAS_V_MON_ABSOLUTE              = 1 << 0x6;
        const SPI_COMMUNICATION                = 1 << 0x7;
        const ADC_DIGITAL_ARC                  = 1 << 0x8;
        const ADC_DIGITAL_OVER_TEMP            = 1 << 0x9;
        const ADC_DIGITAL_GRID                 = 1 << 0xA;
        const FPGA_CURRENT_MONITOR_PULSE_WIDTH = 1 << 0xB;
        const FPGA_PRF                         = 1 << 0xC;
        const HEATER_VOLTAGE_CURRENT_LIMITED   = 1 << 0xD;
        const HEATER_RAMP_TIMEOUT              = 1 << 0xE;
        const MUX_CONFIG_FAILURE               = 1 << 0xF;
    }
}

bitflags! {
    /// Warning/status register. Recomputed from live inputs every tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WarningRegister: u16 {
        const CUSTOMER_HV_ON                 = 1 << 0x0;
        const CUSTOMER_BEAM_ENABLE           = 1 << 0x1;
        const ADC_DIGITAL_HEATER_NOT_READY   = 1 << 0x2;
        const DAC_WRITE_FAILURE              = 1 << 0x3;
        const INTERLOCK_INHIBITING_HV        = 1 << 0x4;
        const CONVERTER_LOGIC_ADC_READ_FAILURE = 1 << 0x5;
        const FPGA_ARC                       = 1 << 0x6;
        const FPGA_MODULE_TEMP_GREATER_75C   = 1 << 0x7;
        const PULSE_WIDTH                    = 1 << 0x8;
        const FPGA_GRID_MODULE_HARDWARE      = 1 << 0x9;
        const FPGA_GRID_MODULE_VOLTAGE       = 1 << 0xA;
        const FPGA_GRID_MODULE_BIAS_VOLTAGE  = 1 << 0xB;
        const FPGA_HV_REGULATION             = 1 << 0xC;
        const FPGA_DIPSWITCH_1_ON            = 1 << 0xD;
        const FPGA_TEST_MODE                 = 1 << 0xE;
        const FPGA_LOCAL_MODE                = 1 << 0xF;
    }
}

const_assert_eq!(core::mem::size_of::<FaultRegister>(), 2);
const_assert_eq!(core::mem::size_of::<WarningRegister>(), 2);

impl Default for FaultRegister {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for WarningRegister {
    fn default() -> Self {
        Self::empty()
    }
}

/// Named fault condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    FpgaFirmwareMajorRevMismatch,
    HvVMonOverRelative,
    HvVMonUnderRelative,
    HtrVMonOverRelative,
    HtrVMonUnderRelative,
    HtrIMonOverAbsolute,
    HtrIMonUnderAbsolute,
    TopVMonOverRelative,
    TopVMonUnderRelative,
    BiasVMonOverAbsolute,
    BiasVMonUnderAbsolute,
    SpiCommunication,
    AdcDigitalArc,
    AdcDigitalOverTemp,
    AdcDigitalGrid,
    FpgaCurrentMonitorPulseWidth,
    FpgaPrf,
    HeaterVoltageCurrentLimited,
    HeaterRampTimeout,
    MuxConfigFailure,
}

impl Fault {
    pub const ALL: [Self; 20] = [
        Self::FpgaFirmwareMajorRevMismatch,
        Self::HvVMonOverRelative,
        Self::HvVMonUnderRelative,
        Self::HtrVMonOverRelative,
        Self::HtrVMonUnderRelative,
        Self::HtrIMonOverAbsolute,
        Self::HtrIMonUnderAbsolute,
        Self::TopVMonOverRelative,
        Self::TopVMonUnderRelative,
        Self::BiasVMonOverAbsolute,
        Self::BiasVMonUnderAbsolute,
        Self::SpiCommunication,
        Self::AdcDigitalArc,
        Self::AdcDigitalOverTemp,
        Self::AdcDigitalGrid,
        Self::FpgaCurrentMonitorPulseWidth,
        Self::FpgaPrf,
        Self::HeaterVoltageCurrentLimited,
        Self::HeaterRampTimeout,
        Self::MuxConfigFailure,
    ];

    /// Register bit this condition latches.
    pub const fn flag(self) -> FaultRegister {
        match self {
            Self::FpgaFirmwareMajorRevMismatch => FaultRegister::FPGA_FIRMWARE_MAJOR_REV_MISMATCH,
            Self::HvVMonOverRelative | Self::HvVMonUnderRelative => {
                FaultRegister::HV_V_MON_RELATIVE
            }
            Self::HtrVMonOverRelative | Self::HtrVMonUnderRelative => {
                FaultRegister::HTR_V_MON_RELATIVE
            }
            Self::HtrIMonOverAbsolute => FaultRegister::HTR_I_MON_OVER_ABSOLUTE,
            Self::HtrIMonUnderAbsolute => FaultRegister::HTR_I_MON_UNDER_ABSOLUTE,
            Self::TopVMonOverRelative | Self::TopVMonUnderRelative => {
                FaultRegister::TOP_V_MON_RELATIVE
            }
            Self::BiasVMonOverAbsolute | Self::BiasVMonUnderAbsolute => {
                FaultRegister::BIAS_V_MON_ABSOLUTE
            }
            Self::SpiCommunication => FaultRegister::SPI_COMMUNICATION,
            Self::AdcDigitalArc => FaultRegister::ADC_DIGITAL_ARC,
            Self::AdcDigitalOverTemp => FaultRegister::ADC_DIGITAL_OVER_TEMP,
            Self::AdcDigitalGrid => FaultRegister::ADC_DIGITAL_GRID,
            Self::FpgaCurrentMonitorPulseWidth => FaultRegister::FPGA_CURRENT_MONITOR_PULSE_WIDTH,
            Self::FpgaPrf => FaultRegister::FPGA_PRF,
            Self::HeaterVoltageCurrentLimited => FaultRegister::HEATER_VOLTAGE_CURRENT_LIMITED,
            Self::HeaterRampTimeout => FaultRegister::HEATER_RAMP_TIMEOUT,
            Self::MuxConfigFailure => FaultRegister::MUX_CONFIG_FAILURE,
        }
    }

    /// Bit position 0..=15.
    #[inline]
    pub const fn bit(self) -> u32 {
        self.flag().bits().trailing_zeros()
    }
}

/// Named warning/status condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    CustomerHvOn,
    CustomerBeamEnable,
    AdcDigitalHeaterNotReady,
    DacWriteFailure,
    InterlockInhibitingHv,
    ConverterLogicAdcReadFailure,
    FpgaArcCounterGreaterZero,
    FpgaArcHighVoltageInhibitActive,
    FpgaModuleTempGreaterThan75C,
    AdcDigitalPulseWidthDuty,
    FpgaPulseWidthLimiting,
    FpgaGridModuleHardwareFault,
    FpgaGridModuleOverVoltage,
    FpgaGridModuleUnderVoltage,
    FpgaGridModuleBiasVoltage,
    FpgaHvRegulationWarning,
    FpgaDipswitch1On,
    FpgaTestModeToggleSwitchTestMode,
    FpgaLocalModeToggleSwitchLocalMode,
}

impl Warning {
    pub const ALL: [Self; 19] = [
        Self::CustomerHvOn,
        Self::CustomerBeamEnable,
        Self::AdcDigitalHeaterNotReady,
        Self::DacWriteFailure,
        Self::InterlockInhibitingHv,
        Self::ConverterLogicAdcReadFailure,
        Self::FpgaArcCounterGreaterZero,
        Self::FpgaArcHighVoltageInhibitActive,
        Self::FpgaModuleTempGreaterThan75C,
        Self::AdcDigitalPulseWidthDuty,
        Self::FpgaPulseWidthLimiting,
        Self::FpgaGridModuleHardwareFault,
        Self::FpgaGridModuleOverVoltage,
        Self::FpgaGridModuleUnderVoltage,
        Self::FpgaGridModuleBiasVoltage,
        Self::FpgaHvRegulationWarning,
        Self::FpgaDipswitch1On,
        Self::FpgaTestModeToggleSwitchTestMode,
        Self::FpgaLocalModeToggleSwitchLocalMode,
    ];

    pub const fn flag(self) -> WarningRegister {
        match self {
            Self::CustomerHvOn => WarningRegister::CUSTOMER_HV_ON,
            Self::CustomerBeamEnable => WarningRegister::CUSTOMER_BEAM_ENABLE,
            Self::AdcDigitalHeaterNotReady => WarningRegister::ADC_DIGITAL_HEATER_NOT_READY,
            Self::DacWriteFailure => WarningRegister::DAC_WRITE_FAILURE,
            Self::InterlockInhibitingHv => WarningRegister::INTERLOCK_INHIBITING_HV,
            Self::ConverterLogicAdcReadFailure => {
                WarningRegister::CONVERTER_LOGIC_ADC_READ_FAILURE
            }
            Self::FpgaArcCounterGreaterZero | Self::FpgaArcHighVoltageInhibitActive => {
                WarningRegister::FPGA_ARC
            }
            Self::FpgaModuleTempGreaterThan75C => WarningRegister::FPGA_MODULE_TEMP_GREATER_75C,
            Self::AdcDigitalPulseWidthDuty | Self::FpgaPulseWidthLimiting => {
                WarningRegister::PULSE_WIDTH
            }
            Self::FpgaGridModuleHardwareFault => WarningRegister::FPGA_GRID_MODULE_HARDWARE,
            Self::FpgaGridModuleOverVoltage | Self::FpgaGridModuleUnderVoltage => {
                WarningRegister::FPGA_GRID_MODULE_VOLTAGE
            }
            Self::FpgaGridModuleBiasVoltage => WarningRegister::FPGA_GRID_MODULE_BIAS_VOLTAGE,
            Self::FpgaHvRegulationWarning => WarningRegister::FPGA_HV_REGULATION,
            Self::FpgaDipswitch1On => WarningRegister::FPGA_DIPSWITCH_1_ON,
            Self::FpgaTestModeToggleSwitchTestMode => WarningRegister::FPGA_TEST_MODE,
            Self::FpgaLocalModeToggleSwitchLocalMode => WarningRegister::FPGA_LOCAL_MODE,
        }
    }

    #[inline]
    pub const fn bit(self) -> u32 {
        self.flag().bits().trailing_zeros()
    }
}

impl FaultRegister {
    /// Latch a fault. Returns true if its bit was not already set.
    #[inline]
    pub fn latch(&mut self, fault: Fault) -> bool {
        let newly = !self.contains(fault.flag());
        self.insert(fault.flag());
        newly
    }

    /// True if the bit backing `fault` is set.
    #[inline]
    pub const fn is_set(&self, fault: Fault) -> bool {
        self.contains(fault.flag())
    }
}

impl WarningRegister {
    /// Set or clear the bit for `warning`.
    ///
    /// Conditions that share a bit must be combined by the caller before
    /// calling this, otherwise the last write wins.
    #[inline]
    pub fn assign(&mut self, warning: Warning, active: bool) {
        self.set(warning.flag(), active);
    }

    #[inline]
    pub const fn is_set(&self, warning: Warning) -> bool {
        self.contains(warning.flag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn fault_bits_unique_except_documented_pairs() {
        let mut by_bit: HashMap<u32, Vec<Fault>> = HashMap::new();
        for fault in Fault::ALL {
            by_bit.entry(fault.bit()).or_default().push(fault);
        }
        assert_eq!(by_bit.len(), 16, "every fault bit carries a condition");

        let shared: Vec<(u32, Vec<Fault>)> = {
            let mut v: Vec<_> = by_bit.into_iter().filter(|(_, f)| f.len() > 1).collect();
            v.sort_by_key(|(bit, _)| *bit);
            v
        };
        assert_eq!(
            shared,
            vec![
                (1, vec![Fault::HvVMonOverRelative, Fault::HvVMonUnderRelative]),
                (2, vec![Fault::HtrVMonOverRelative, Fault::HtrVMonUnderRelative]),
                (5, vec![Fault::TopVMonOverRelative, Fault::TopVMonUnderRelative]),
                (6, vec![Fault::BiasVMonOverAbsolute, Fault::BiasVMonUnderAbsolute]),
            ]
        );
    }

    #[test]
    fn warning_bits_unique_except_documented_pairs() {
        let mut by_bit: HashMap<u32, Vec<Warning>> = HashMap::new();
        for warning in Warning::ALL {
            by_bit.entry(warning.bit()).or_default().push(warning);
        }
        assert_eq!(by_bit.len(), 16);

        let mut shared: Vec<(u32, Vec<Warning>)> =
            by_bit.into_iter().filter(|(_, w)| w.len() > 1).collect();
        shared.sort_by_key(|(bit, _)| *bit);
        assert_eq!(
            shared,
            vec![
                (
                    6,
                    vec![
                        Warning::FpgaArcCounterGreaterZero,
                        Warning::FpgaArcHighVoltageInhibitActive
                    ]
                ),
                (
                    8,
                    vec![Warning::AdcDigitalPulseWidthDuty, Warning::FpgaPulseWidthLimiting]
                ),
                (
                    0xA,
                    vec![
                        Warning::FpgaGridModuleOverVoltage,
                        Warning::FpgaGridModuleUnderVoltage
                    ]
                ),
            ]
        );
    }

    #[test]
    fn fixed_positions_match_register_layout() {
        assert_eq!(Fault::FpgaFirmwareMajorRevMismatch.bit(), 0);
        assert_eq!(Fault::SpiCommunication.bit(), 7);
        assert_eq!(Fault::FpgaPrf.bit(), 0xC);
        assert_eq!(Fault::MuxConfigFailure.bit(), 0xF);
        assert_eq!(Warning::ConverterLogicAdcReadFailure.bit(), 5);
        assert_eq!(Warning::FpgaLocalModeToggleSwitchLocalMode.bit(), 0xF);
    }

    #[test]
    fn latch_reports_new_bits_only() {
        let mut faults = FaultRegister::default();
        assert!(faults.latch(Fault::HvVMonOverRelative));
        assert!(!faults.latch(Fault::HvVMonUnderRelative));
        assert!(faults.is_set(Fault::HvVMonUnderRelative));
        assert_eq!(faults.bits(), 0x0002);
    }

    #[test]
    fn warnings_assign_and_clear() {
        let mut warnings = WarningRegister::default();
        warnings.assign(Warning::FpgaDipswitch1On, true);
        warnings.assign(Warning::CustomerHvOn, true);
        assert_eq!(warnings.bits(), 0x2001);
        warnings.assign(Warning::FpgaDipswitch1On, false);
        assert_eq!(warnings.bits(), 0x0001);
    }
}
