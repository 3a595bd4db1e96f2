//! SPI watchdog.
//!
//! The watchdog oscillator DAC channel alternates between two fixed codes
//! every `WATCHDOG_MAX_COUNT` ticks. The converter board loops the channel
//! back into its DAC-monitor ADC input; a readback outside the window for the
//! current mode means the SPI link (or the board) is not doing what it is
//! told.

use gun_common::consts::{
    MAX_WD_VALUE_0, MAX_WD_VALUE_1, MIN_WD_VALUE_0, MIN_WD_VALUE_1, WATCHDOG_MAX_COUNT,
    WATCHDOG_MODE_0, WATCHDOG_MODE_1, WATCHDOG_VALUE_0, WATCHDOG_VALUE_1,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum WatchdogMode {
    #[default]
    Mode0 = WATCHDOG_MODE_0,
    Mode1 = WATCHDOG_MODE_1,
}

impl WatchdogMode {
    /// Code written to the oscillator channel.
    pub const fn value(self) -> u16 {
        match self {
            Self::Mode0 => WATCHDOG_VALUE_0,
            Self::Mode1 => WATCHDOG_VALUE_1,
        }
    }

    /// Accepted readback window, inclusive.
    pub const fn window(self) -> (u16, u16) {
        match self {
            Self::Mode0 => (MIN_WD_VALUE_0, MAX_WD_VALUE_0),
            Self::Mode1 => (MIN_WD_VALUE_1, MAX_WD_VALUE_1),
        }
    }

    const fn toggled(self) -> Self {
        match self {
            Self::Mode0 => Self::Mode1,
            Self::Mode1 => Self::Mode0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiWatchdog {
    counter: u16,
    mode: WatchdogMode,
    state_change: bool,
}

impl Default for SpiWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl SpiWatchdog {
    /// Starts in mode 0 with the first check skipped, since nothing has been
    /// written to the oscillator yet.
    pub const fn new() -> Self {
        Self {
            counter: 0,
            mode: WatchdogMode::Mode0,
            state_change: true,
        }
    }

    /// Check the DAC-monitor readback sampled this tick. Returns false on a
    /// mismatch. The tick after a mode change is not checked.
    pub fn check(&mut self, readback: u16) -> bool {
        if self.state_change {
            self.state_change = false;
            return true;
        }
        let (min, max) = self.mode.window();
        (min..=max).contains(&readback)
    }

    /// Advance one tick. Returns true when the mode toggled.
    pub fn advance(&mut self) -> bool {
        self.counter += 1;
        if self.counter < WATCHDOG_MAX_COUNT {
            return false;
        }
        self.counter = 0;
        self.mode = self.mode.toggled();
        self.state_change = true;
        true
    }

    /// Code to write to the oscillator channel this tick.
    #[inline]
    pub const fn value(&self) -> u16 {
        self.mode.value()
    }

    #[inline]
    pub const fn mode(&self) -> WatchdogMode {
        self.mode
    }

    #[inline]
    pub const fn counter(&self) -> u16 {
        self.counter
    }

    #[inline]
    pub const fn state_change(&self) -> bool {
        self.state_change
    }
}
