//! Debounced digital inputs and the converter-logic-board status words.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::consts::{
    ADC_DATA_DIGITAL_HIGH, TARGET_CUSTOMER_HARDWARE_REV, TARGET_FPGA_FIRMWARE_MAJOR_REV,
    TARGET_FPGA_FIRMWARE_MINOR_REV,
};

// ─── DigitalInput ───────────────────────────────────────────────────

/// Debounced boolean.
///
/// The filtered level flips once `filter` consecutive raw samples disagree
/// with it. `filter == 0` follows the raw level directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalInput {
    filtered: bool,
    disagree: u16,
    filter: u16,
}

impl DigitalInput {
    pub const fn new(filter: u16) -> Self {
        Self {
            filtered: false,
            disagree: 0,
            filter,
        }
    }

    /// Feed one raw sample; returns the filtered level.
    pub fn update(&mut self, raw: bool) -> bool {
        if raw == self.filtered {
            self.disagree = 0;
            return self.filtered;
        }
        self.disagree = self.disagree.saturating_add(1);
        if self.disagree >= self.filter {
            self.filtered = raw;
            self.disagree = 0;
        }
        self.filtered
    }

    #[inline]
    pub const fn level(&self) -> bool {
        self.filtered
    }

    /// Force the filtered level, e.g. at start-up.
    #[inline]
    pub fn preset(&mut self, level: bool) {
        self.filtered = level;
        self.disagree = 0;
    }
}

// ─── FPGA status ────────────────────────────────────────────────────

bitflags! {
    /// The 19 status lines read from the converter-logic-board FPGA.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FpgaStatus: u32 {
        const PCB_REV_MISMATCH                 = 1 << 0;
        const FIRMWARE_MAJOR_REV_MISMATCH      = 1 << 1;
        const FIRMWARE_MINOR_REV_MISMATCH      = 1 << 2;
        const ARC                              = 1 << 3;
        const ARC_HIGH_VOLTAGE_INHIBIT_ACTIVE  = 1 << 4;
        const HEATER_VOLTAGE_LESS_THAN_4_5V    = 1 << 5;
        const MODULE_TEMP_GREATER_THAN_65C     = 1 << 6;
        const MODULE_TEMP_GREATER_THAN_75C     = 1 << 7;
        const PULSE_WIDTH_LIMITING_ACTIVE      = 1 << 8;
        const PRF_FAULT                        = 1 << 9;
        const CURRENT_MONITOR_PULSE_WIDTH_FAULT = 1 << 10;
        const GRID_MODULE_HARDWARE_FAULT       = 1 << 11;
        const GRID_MODULE_OVER_VOLTAGE_FAULT   = 1 << 12;
        const GRID_MODULE_UNDER_VOLTAGE_FAULT  = 1 << 13;
        const GRID_MODULE_BIAS_VOLTAGE_FAULT   = 1 << 14;
        const HV_REGULATION_WARNING            = 1 << 15;
        const DIPSWITCH_1_ON                   = 1 << 16;
        const TEST_MODE_TOGGLE_SWITCH_SET_TO_TEST = 1 << 17;
        const LOCAL_MODE_TOGGLE_SWITCH_SET_TO_LOCAL = 1 << 18;
    }
}

/// Raw FPGA word: revision fields plus the live status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FpgaReadout {
    pub customer_hardware_rev: u8,
    pub firmware_major_rev: u8,
    pub firmware_minor_rev: u8,
    /// Status lines as reported. Mismatch bits here are ignored and
    /// recomputed by [`status`](Self::status).
    pub lines: FpgaStatus,
}

impl FpgaReadout {
    /// Readout that matches every revision target.
    pub const fn matching(lines: FpgaStatus) -> Self {
        Self {
            customer_hardware_rev: TARGET_CUSTOMER_HARDWARE_REV,
            firmware_major_rev: TARGET_FPGA_FIRMWARE_MAJOR_REV,
            firmware_minor_rev: TARGET_FPGA_FIRMWARE_MINOR_REV,
            lines,
        }
    }

    /// Status lines with the three revision-mismatch bits derived from the
    /// revision fields.
    pub fn status(&self) -> FpgaStatus {
        let mismatch = FpgaStatus::PCB_REV_MISMATCH
            | FpgaStatus::FIRMWARE_MAJOR_REV_MISMATCH
            | FpgaStatus::FIRMWARE_MINOR_REV_MISMATCH;
        let mut status = self.lines.difference(mismatch);
        status.set(
            FpgaStatus::PCB_REV_MISMATCH,
            self.customer_hardware_rev != TARGET_CUSTOMER_HARDWARE_REV,
        );
        status.set(
            FpgaStatus::FIRMWARE_MAJOR_REV_MISMATCH,
            self.firmware_major_rev != TARGET_FPGA_FIRMWARE_MAJOR_REV,
        );
        status.set(
            FpgaStatus::FIRMWARE_MINOR_REV_MISMATCH,
            self.firmware_minor_rev != TARGET_FPGA_FIRMWARE_MINOR_REV,
        );
        status
    }
}

// ─── ADC digital fault lines ────────────────────────────────────────

bitflags! {
    /// Fault lines the converter-logic board reports through ADC channels.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AdcDigitalLines: u8 {
        const WARMUP           = 1 << 0;
        const WATCHDOG         = 1 << 1;
        const ARC              = 1 << 2;
        const OVER_TEMP        = 1 << 3;
        const PULSE_WIDTH_DUTY = 1 << 4;
        const GRID             = 1 << 5;
    }
}

impl AdcDigitalLines {
    /// Interpret the six ADC codes in flag order. A line is high at or above
    /// `ADC_DATA_DIGITAL_HIGH`.
    pub fn from_codes(codes: [u16; 6]) -> Self {
        let mut lines = Self::empty();
        for (flag, code) in Self::all().iter().zip(codes) {
            lines.set(flag, code >= ADC_DATA_DIGITAL_HIGH);
        }
        lines
    }
}

/// Debounce filter settings, sample counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalFilterConfig {
    /// FPGA status lines.
    pub fpga: u16,
    /// ADC digital fault lines.
    pub adc_digital: u16,
    /// Customer pins and the interlock relay.
    pub discrete: u16,
}

impl Default for DigitalFilterConfig {
    fn default() -> Self {
        Self {
            fpga: 0,
            adc_digital: 0,
            discrete: 3,
        }
    }
}
