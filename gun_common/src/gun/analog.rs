//! Calibrated analog inputs and outputs.
//!
//! Inputs convert a raw ADC code to an engineering value and carry the
//! relative/absolute trip bookkeeping. Outputs hold a set-point plus enable
//! flag and produce the DAC code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::DAC_DIGITAL_OFF;

/// Saturating float → u16. `as` clamps to the target range and maps NaN to 0.
#[inline]
fn saturate_u16(value: f64) -> u16 {
    value as u16
}

// ─── Calibration ────────────────────────────────────────────────────

/// Fixed scale/offset pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub scale: f64,
    #[serde(default)]
    pub offset: i32,
}

impl Calibration {
    pub const fn new(scale: f64, offset: i32) -> Self {
        Self { scale, offset }
    }

    /// Input direction: `(raw − offset) × scale`.
    #[inline]
    pub fn to_engineering(&self, raw: u16) -> u16 {
        saturate_u16((i64::from(raw) - i64::from(self.offset)) as f64 * self.scale)
    }

    /// Output direction: `value × scale + offset`.
    #[inline]
    pub fn to_dac(&self, value: u16) -> u16 {
        saturate_u16(f64::from(value) * self.scale + f64::from(self.offset))
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 0)
    }
}

// ─── Trip settings ──────────────────────────────────────────────────

/// Band around the commanded target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeTrip {
    /// Fraction of the target that is tolerated.
    pub scale: f64,
    /// Minimum band width [engineering units].
    pub floor: u16,
    /// Samples out of band before tripping.
    pub count: u16,
}

impl RelativeTrip {
    /// `max(target × scale, floor)`.
    #[inline]
    pub fn band(&self, target: u16) -> u16 {
        saturate_u16(f64::from(target) * self.scale).max(self.floor)
    }
}

/// Fixed over/under limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsoluteTrip {
    pub over: u16,
    pub under: u16,
    /// Samples out of limit before tripping.
    pub count: u16,
}

/// Leaky up/down counter. Out-of-limit samples count up, good samples count
/// down to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TripCounter {
    count: u16,
}

impl TripCounter {
    /// Feed one sample; true once the counter is strictly above `limit`.
    #[inline]
    pub fn step(&mut self, out_of_limit: bool, limit: u16) -> bool {
        self.count = if out_of_limit {
            self.count.saturating_add(1)
        } else {
            self.count.saturating_sub(1)
        };
        self.count > limit
    }

    #[inline]
    pub const fn count(&self) -> u16 {
        self.count
    }

    #[inline]
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Result of one trip evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TripResult {
    pub over: bool,
    pub under: bool,
}

impl TripResult {
    #[inline]
    pub const fn any(&self) -> bool {
        self.over || self.under
    }
}

// ─── Input ──────────────────────────────────────────────────────────

/// Configuration of one monitored input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalogInputConfig {
    pub calibration: Calibration,
    #[serde(default)]
    pub relative_trip: Option<RelativeTrip>,
    #[serde(default)]
    pub absolute_trip: Option<AbsoluteTrip>,
}

/// Monitored analog input.
///
/// Written only by the sampling path.
#[derive(Debug, Clone, Default)]
pub struct AnalogInput {
    config: AnalogInputConfig,
    raw: u16,
    value: u16,
    target: u16,
    accumulator: u32,
    accumulated: u16,
    relative_over: TripCounter,
    relative_under: TripCounter,
    absolute_over: TripCounter,
    absolute_under: TripCounter,
}

impl AnalogInput {
    pub fn new(config: AnalogInputConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Store a raw sample and rescale.
    #[inline]
    pub fn update(&mut self, raw: u16) -> u16 {
        self.raw = raw;
        self.value = self.config.calibration.to_engineering(raw);
        self.value
    }

    /// Add a raw sample to the running sum. Once `window` samples are in,
    /// the mean is applied through [`update`](Self::update) and returned.
    pub fn accumulate(&mut self, raw: u16, window: u16) -> Option<u16> {
        self.accumulator += u32::from(raw);
        self.accumulated += 1;
        if self.accumulated < window.max(1) {
            return None;
        }
        let mean = (self.accumulator / u32::from(self.accumulated)) as u16;
        self.accumulator = 0;
        self.accumulated = 0;
        Some(self.update(mean))
    }

    /// Commanded value the relative trip is measured against.
    #[inline]
    pub fn set_target(&mut self, target: u16) {
        self.target = target;
    }

    /// Relative band check. While `output_enabled` is false the counters are
    /// held at zero and nothing trips.
    pub fn check_relative(&mut self, output_enabled: bool) -> TripResult {
        let Some(trip) = self.config.relative_trip else {
            return TripResult::default();
        };
        if !output_enabled {
            self.relative_over.reset();
            self.relative_under.reset();
            return TripResult::default();
        }
        let band = trip.band(self.target);
        let over = self.value > self.target.saturating_add(band);
        let under = self.value < self.target.saturating_sub(band);
        TripResult {
            over: self.relative_over.step(over, trip.count),
            under: self.relative_under.step(under, trip.count),
        }
    }

    pub fn check_absolute(&mut self) -> TripResult {
        let Some(trip) = self.config.absolute_trip else {
            return TripResult::default();
        };
        TripResult {
            over: self.absolute_over.step(self.value > trip.over, trip.count),
            under: self.absolute_under.step(self.value < trip.under, trip.count),
        }
    }

    /// Absolute check with the under limit disarmed; its counter is held at
    /// zero.
    pub fn check_absolute_over(&mut self) -> TripResult {
        self.absolute_under.reset();
        let Some(trip) = self.config.absolute_trip else {
            return TripResult::default();
        };
        TripResult {
            over: self.absolute_over.step(self.value > trip.over, trip.count),
            under: false,
        }
    }

    pub fn reset_trips(&mut self) {
        self.relative_over.reset();
        self.relative_under.reset();
        self.absolute_over.reset();
        self.absolute_under.reset();
    }

    #[inline]
    pub const fn raw(&self) -> u16 {
        self.raw
    }

    /// Engineering value.
    #[inline]
    pub const fn value(&self) -> u16 {
        self.value
    }

    #[inline]
    pub const fn target(&self) -> u16 {
        self.target
    }

    #[inline]
    pub const fn config(&self) -> &AnalogInputConfig {
        &self.config
    }
}

// ─── Output ─────────────────────────────────────────────────────────

/// Set-point outside the output's programmable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("set-point {value} outside [{min}, {max}]")]
pub struct OutOfRange {
    pub value: u16,
    pub min: u16,
    pub max: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogOutputConfig {
    pub calibration: Calibration,
    #[serde(default)]
    pub min: u16,
    #[serde(default = "max_u16")]
    pub max: u16,
}

fn max_u16() -> u16 {
    u16::MAX
}

impl Default for AnalogOutputConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            min: 0,
            max: u16::MAX,
        }
    }
}

/// Calibrated DAC output.
#[derive(Debug, Clone, Default)]
pub struct AnalogOutput {
    config: AnalogOutputConfig,
    set_point: u16,
    enabled: bool,
}

impl AnalogOutput {
    pub fn new(config: AnalogOutputConfig) -> Self {
        Self {
            config,
            set_point: 0,
            enabled: false,
        }
    }

    /// Range-checked set-point update. The previous value is kept on error.
    pub fn set_point(&mut self, value: u16) -> Result<(), OutOfRange> {
        self.check(value)?;
        self.set_point = value;
        Ok(())
    }

    /// Range check only.
    pub fn check(&self, value: u16) -> Result<(), OutOfRange> {
        if value < self.config.min || value > self.config.max {
            return Err(OutOfRange {
                value,
                min: self.config.min,
                max: self.config.max,
            });
        }
        Ok(())
    }

    /// Unchecked update for monitor outputs that mirror a measured value.
    #[inline]
    pub fn mirror(&mut self, value: u16) {
        self.set_point = value;
    }

    #[inline]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub const fn value(&self) -> u16 {
        self.set_point
    }

    /// Code to write to the DAC. Disabled outputs write `DAC_DIGITAL_OFF`.
    #[inline]
    pub fn dac_code(&self) -> u16 {
        if self.enabled {
            self.config.calibration.to_dac(self.set_point)
        } else {
            DAC_DIGITAL_OFF
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative_input(count: u16) -> AnalogInput {
        AnalogInput::new(AnalogInputConfig {
            calibration: Calibration::default(),
            relative_trip: Some(RelativeTrip {
                scale: 0.2,
                floor: 1000,
                count,
            }),
            absolute_trip: None,
        })
    }

    #[test]
    fn calibration_subtracts_offset_before_scaling() {
        let cal = Calibration::new(0.5, 100);
        assert_eq!(cal.to_engineering(300), 100);
        assert_eq!(cal.to_engineering(50), 0, "negative saturates at zero");
        assert_eq!(Calibration::new(10.0, 0).to_engineering(u16::MAX), u16::MAX);
    }

    #[test]
    fn dac_code_off_when_disabled() {
        let mut out = AnalogOutput::new(AnalogOutputConfig {
            calibration: Calibration::new(3.0, 0),
            min: 0,
            max: 20_000,
        });
        out.set_point(1000).unwrap();
        assert_eq!(out.dac_code(), DAC_DIGITAL_OFF);
        out.set_enabled(true);
        assert_eq!(out.dac_code(), 3000);
        out.set_point(20_000).unwrap();
        assert_eq!(out.dac_code(), u16::MAX, "saturates");
    }

    #[test]
    fn set_point_range_is_inclusive() {
        let mut out = AnalogOutput::new(AnalogOutputConfig {
            calibration: Calibration::default(),
            min: 10,
            max: 20,
        });
        assert!(out.set_point(10).is_ok());
        assert!(out.set_point(20).is_ok());
        let err = out.set_point(21).unwrap_err();
        assert_eq!(err, OutOfRange { value: 21, min: 10, max: 20 });
        assert_eq!(out.value(), 20);
        assert!(out.set_point(9).is_err());
    }

    #[test]
    fn relative_band_uses_floor() {
        let trip = RelativeTrip {
            scale: 0.2,
            floor: 1000,
            count: 1,
        };
        assert_eq!(trip.band(2000), 1000);
        assert_eq!(trip.band(10_000), 2000);
    }

    #[test]
    fn relative_trip_fires_strictly_after_count() {
        let mut input = relative_input(3);
        input.set_target(10_000);
        input.update(13_000);
        for _ in 0..3 {
            assert!(!input.check_relative(true).over);
        }
        let result = input.check_relative(true);
        assert!(result.over);
        assert!(!result.under);
    }

    #[test]
    fn relative_trip_held_while_disabled() {
        let mut input = relative_input(0);
        input.set_target(10_000);
        input.update(0);
        assert!(!input.check_relative(false).any());
        assert!(input.check_relative(true).under);
        assert!(!input.check_relative(false).under);
    }

    #[test]
    fn counter_leaks_back_down() {
        let mut counter = TripCounter::default();
        assert!(!counter.step(true, 1));
        assert!(!counter.step(false, 1));
        assert_eq!(counter.count(), 0);
        assert!(!counter.step(false, 1));
        assert_eq!(counter.count(), 0);
        counter.step(true, 1);
        assert!(counter.step(true, 1));
    }

    #[test]
    fn absolute_trip_over_and_under() {
        let mut input = AnalogInput::new(AnalogInputConfig {
            calibration: Calibration::default(),
            relative_trip: None,
            absolute_trip: Some(AbsoluteTrip {
                over: 18_000,
                under: 14_000,
                count: 0,
            }),
        });
        input.update(16_000);
        assert!(!input.check_absolute().any());
        input.update(18_001);
        assert!(input.check_absolute().over);
        input.reset_trips();
        input.update(13_999);
        let result = input.check_absolute();
        assert!(result.under && !result.over);
    }

    #[test]
    fn disarmed_under_limit_holds_its_counter() {
        let mut input = AnalogInput::new(AnalogInputConfig {
            calibration: Calibration::default(),
            relative_trip: None,
            absolute_trip: Some(AbsoluteTrip {
                over: 1600,
                under: 200,
                count: 2,
            }),
        });
        input.update(0);
        for _ in 0..10 {
            assert!(!input.check_absolute_over().any());
        }
        // Armed again, the under count starts from zero.
        assert!(!input.check_absolute().under);
        assert!(!input.check_absolute().under);
        assert!(input.check_absolute().under);

        input.update(1601);
        input.check_absolute_over();
        input.check_absolute_over();
        assert!(input.check_absolute_over().over);
    }

    #[test]
    fn check_leaves_set_point_alone() {
        let mut out = AnalogOutput::new(AnalogOutputConfig {
            calibration: Calibration::default(),
            min: 0,
            max: 8000,
        });
        out.set_point(100).unwrap();
        assert!(out.check(8000).is_ok());
        assert_eq!(out.check(8001).map_err(|e| e.max), Err(8000));
        assert_eq!(out.value(), 100);
    }

    #[test]
    fn accumulate_averages_window() {
        let mut input = AnalogInput::new(AnalogInputConfig::default());
        assert_eq!(input.accumulate(100, 4), None);
        assert_eq!(input.accumulate(200, 4), None);
        assert_eq!(input.accumulate(300, 4), None);
        assert_eq!(input.accumulate(400, 4), Some(250));
        assert_eq!(input.raw(), 250);
        assert_eq!(input.accumulate(8, 1), Some(8));
    }
}
