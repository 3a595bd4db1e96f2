//! Converter-board communication error trackers.

use tracing::warn;

use crate::board::{ConverterBoard, DacChannel};

/// ADC read bookkeeping.
///
/// `error_test` is a leaky counter: +1 per failed read, −1 per good read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcErrorTracker {
    error_count: u16,
    error_test: u16,
    read_ok: bool,
}

impl AdcErrorTracker {
    /// Record one read. Returns true while `error_test` is strictly above
    /// `max_errors`.
    pub fn record(&mut self, ok: bool, max_errors: u16) -> bool {
        if ok {
            self.error_test = self.error_test.saturating_sub(1);
        } else {
            self.error_count = self.error_count.wrapping_add(1);
            self.error_test = self.error_test.saturating_add(1);
        }
        self.read_ok = ok;
        self.error_test > max_errors
    }

    /// Total failed reads (wraps).
    #[inline]
    pub const fn error_count(&self) -> u16 {
        self.error_count
    }

    #[inline]
    pub const fn error_test(&self) -> u16 {
        self.error_test
    }

    /// Outcome of the most recent read.
    #[inline]
    pub const fn read_ok(&self) -> bool {
        self.read_ok
    }

    pub fn reset_test(&mut self) {
        self.error_test = 0;
    }
}

/// DAC transmission bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DacWriteTracker {
    error_count: u16,
    failure_count: u16,
    failure: bool,
}

impl DacWriteTracker {
    /// Write `code` to `channel`, retrying up to `max_attempts` times.
    ///
    /// Every failed attempt counts a write error; if all attempts fail the
    /// failure count increments. Returns true if the code went out.
    pub fn write<B: ConverterBoard + ?Sized>(
        &mut self,
        board: &mut B,
        channel: DacChannel,
        code: u16,
        max_attempts: u16,
    ) -> bool {
        for _ in 0..max_attempts.max(1) {
            match board.write_dac(channel, code) {
                Ok(()) => return true,
                Err(_) => self.error_count = self.error_count.wrapping_add(1),
            }
        }
        self.failure_count = self.failure_count.wrapping_add(1);
        warn!(?channel, code, attempts = max_attempts, "DAC write gave up");
        false
    }

    /// Latch the outcome of a full tick of writes.
    #[inline]
    pub fn set_failure(&mut self, failed: bool) {
        self.failure = failed;
    }

    #[inline]
    pub const fn error_count(&self) -> u16 {
        self.error_count
    }

    #[inline]
    pub const fn failure_count(&self) -> u16 {
        self.failure_count
    }

    /// True if the previous tick had a channel that could not be written.
    #[inline]
    pub const fn failure(&self) -> bool {
        self.failure
    }
}
