//! 10 ms control tick: sample → command → trips → control → outputs → shadow.
//!
//! ## Tick body
//! 1. Read the converter board (ADC scan, FPGA word, internal rails, pins).
//! 2. Discrete pins into requests.
//! 3. Trips and digital fault lines.
//! 4. Control service: run time, countdowns, reset, SPI watchdog.
//! 5. Output gating and heater regulation, then every DAC channel written
//!    with retries.
//! 6. Warning register, then the Modbus shadow tables.
//!
//! ## Pacing
//! With the `rt` feature the loop sleeps on `CLOCK_MONOTONIC` with
//! `TIMER_ABSTIME` and an overrun ends the loop. Without it the loop uses
//! `std::thread::sleep` and only counts overruns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gun_common::gun::config::BoardConfig;
use gun_common::prelude::TICK_TIME_US;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::board::{BoardError, ConverterBoard, DacChannel};
use crate::modbus::shadow;
use crate::state::{GlobalControlState, SharedControlState};

// ─── Tick statistics ────────────────────────────────────────────────

/// Per-tick timing statistics.
#[derive(Debug, Clone)]
pub struct TickStats {
    pub tick_count: u64,
    /// Last tick body duration [ns].
    pub last_tick_ns: i64,
    pub min_tick_ns: i64,
    pub max_tick_ns: i64,
    pub sum_tick_ns: i64,
    pub overruns: u64,
    /// Worst wake-up latency [ns]. Only measured with `rt`.
    pub max_latency_ns: i64,
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TickStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        self.min_tick_ns = self.min_tick_ns.min(duration_ns);
        self.max_tick_ns = self.max_tick_ns.max(duration_ns);
        self.sum_tick_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average tick body duration [ns], 0 before the first tick.
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TickError {
    #[error("converter board: {0}")]
    Board(#[from] BoardError),

    #[error("tick overrun: {actual_ns}ns > {budget_ns}ns budget")]
    Overrun { actual_ns: i64, budget_ns: i64 },

    #[error("RT setup error: {0}")]
    RtSetup(String),
}

// ─── RT setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), TickError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| TickError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), TickError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), TickError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| TickError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| TickError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), TickError> {
    Ok(())
}

/// Lock memory and optionally pin the tick thread. No-op without `rt`.
pub fn rt_setup(cpu_core: Option<usize>) -> Result<(), TickError> {
    rt_mlockall()?;
    if let Some(cpu) = cpu_core {
        rt_set_affinity(cpu)?;
    }
    Ok(())
}

// ─── Tick runner ────────────────────────────────────────────────────

/// Owns the board and drives the shared state once per tick.
pub struct TickRunner<B: ConverterBoard> {
    board: B,
    shared: Arc<SharedControlState>,
    stats: TickStats,
    tick_time_ns: i64,
}

impl<B: ConverterBoard> TickRunner<B> {
    pub fn new(board: B, shared: Arc<SharedControlState>) -> Self {
        Self {
            board,
            shared,
            stats: TickStats::new(),
            tick_time_ns: TICK_TIME_US as i64 * 1000,
        }
    }

    /// Build the shared state for `config` and a runner over it.
    pub fn with_config(board: B, config: &BoardConfig) -> Self {
        let shared = Arc::new(SharedControlState::new(GlobalControlState::new(config)));
        Self::new(board, shared)
    }

    /// Initialise the board and publish the start-up shadow tables.
    pub fn init(&mut self) -> Result<(), TickError> {
        self.board.init()?;
        shadow::refresh(&mut self.shared.lock());
        info!(board = self.board.name(), "tick runner initialised");
        Ok(())
    }

    /// One tick with the lock held for the whole body.
    pub fn tick(&mut self) {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.lock();
        self.step(&mut state);
    }

    /// Tick body against an already-borrowed state.
    pub fn step(&mut self, state: &mut GlobalControlState) {
        let board = &mut self.board;

        // ═══ SAMPLE ═══
        {
            let mut sampling = state.sampling();
            match board.read_adc() {
                Ok(frame) => {
                    sampling.apply_adc(&frame);
                    sampling.record_adc_read(true);
                }
                Err(e) => {
                    debug!(error = %e, "ADC scan failed");
                    sampling.record_adc_read(false);
                }
            }
            match board.read_fpga() {
                Ok(readout) => sampling.apply_fpga(readout),
                Err(e) => debug!(error = %e, "FPGA read failed, keeping last status"),
            }
            sampling.apply_internal(board.read_internal_adc());
            sampling.apply_discrete(board.read_discrete());
        }

        // ═══ COMMAND ═══
        state.command().apply_discrete();

        // ═══ TRIPS ═══
        {
            let mut sampling = state.sampling();
            sampling.check_trips();
            sampling.check_digital_faults();
        }

        // ═══ CONTROL ═══
        {
            let mut control = state.control();
            control.advance_run_time();
            control.service_timers();
            control.service_reset();
            control.service_watchdog();
            control.drive_outputs();
            control.regulate_heater();
        }

        // ═══ WRITE ═══
        write_dacs(board, state);

        // ═══ PUBLISH ═══
        state.sampling().update_status();
        shadow::refresh(state);
    }

    /// Run until `running` clears or `max_ticks` have executed.
    pub fn run(&mut self, running: &AtomicBool, max_ticks: Option<u64>) -> Result<(), TickError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(running, max_ticks)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_sim_loop(running, max_ticks)
        }
    }

    #[cfg(feature = "rt")]
    fn run_rt_loop(&mut self, running: &AtomicBool, max_ticks: Option<u64>) -> Result<(), TickError> {
        use nix::sys::time::TimeSpec;
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let now = |clock| {
            clock_gettime(clock).map_err(|e| TickError::RtSetup(format!("clock_gettime: {e}")))
        };
        let step = TimeSpec::from(std::time::Duration::from_nanos(self.tick_time_ns as u64));
        let mut next_wake = now(clock)?;

        while running.load(Ordering::Relaxed) && !self.done(max_ticks) {
            next_wake = next_wake + step;

            let start = now(clock)?;
            let latency_ns = diff_ns(&start, &next_wake).abs();
            self.tick();
            let end = now(clock)?;
            let duration_ns = diff_ns(&end, &start);
            self.stats.record(duration_ns, latency_ns);

            if duration_ns > self.tick_time_ns {
                self.stats.overruns += 1;
                return Err(TickError::Overrun {
                    actual_ns: duration_ns,
                    budget_ns: self.tick_time_ns,
                });
            }

            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }

    #[cfg(not(feature = "rt"))]
    fn run_sim_loop(&mut self, running: &AtomicBool, max_ticks: Option<u64>) -> Result<(), TickError> {
        use std::time::{Duration, Instant};

        let budget = Duration::from_nanos(self.tick_time_ns as u64);
        while running.load(Ordering::Relaxed) && !self.done(max_ticks) {
            let start = Instant::now();
            self.tick();
            let elapsed = start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;
            self.stats.record(duration_ns, 0);

            if duration_ns > self.tick_time_ns {
                self.stats.overruns += 1;
                warn!(duration_ns, "tick overrun");
            }
            if let Some(remaining) = budget.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    fn done(&self, max_ticks: Option<u64>) -> bool {
        max_ticks.is_some_and(|max| self.stats.tick_count >= max)
    }

    /// Release the board.
    pub fn shutdown(&mut self) -> Result<(), TickError> {
        self.board.shutdown()?;
        info!(
            ticks = self.stats.tick_count,
            overruns = self.stats.overruns,
            avg_ns = self.stats.avg_tick_ns(),
            max_ns = self.stats.max_tick_ns,
            "tick runner stopped"
        );
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    #[inline]
    pub fn shared(&self) -> &Arc<SharedControlState> {
        &self.shared
    }

    #[inline]
    pub fn board(&self) -> &B {
        &self.board
    }

    /// For fault injection in tests.
    #[inline]
    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }
}

/// Write every DAC channel, retrying each up to the configured attempts.
fn write_dacs<B: ConverterBoard + ?Sized>(board: &mut B, state: &mut GlobalControlState) {
    let attempts = state.settings.control.max_dac_tx_attempts;
    let mut failed = false;
    for channel in DacChannel::ALL {
        let code = state.dac_code(channel);
        if !state.dac_errors.write(board, channel, code, attempts) {
            failed = true;
        }
    }
    state.dac_errors.set_failure(failed);
}

#[cfg(feature = "rt")]
fn diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
