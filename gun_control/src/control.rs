//! Control path: state, fault clearing, timers, counters, heater
//! regulation and output enables.
//!
//! States are data here. Whatever decides transitions calls
//! [`ControlPath::set_state`]; this module only keeps the record consistent
//! (state message, latched faults, enable gating). The one transition it
//! makes itself is `FaultHeaterFailure` once heater starts are used up.

use gun_common::consts::{DAC_DIGITAL_OFF, DAC_DIGITAL_ON, TICKS_PER_SECOND};
use gun_common::gun::fault::{Fault, FaultRegister};
use gun_common::gun::state::ControlState;
use tracing::{debug, info, warn};

use crate::state::{GlobalControlState, HeaterPhase};

// ─── Countdown ──────────────────────────────────────────────────────

/// Tick countdown. Expired once it has been started and reached zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    remaining: u16,
    armed: bool,
}

impl Countdown {
    pub fn start(&mut self, ticks: u16) {
        self.remaining = ticks;
        self.armed = true;
    }

    pub fn stop(&mut self) {
        self.remaining = 0;
        self.armed = false;
    }

    /// One tick. Returns true on the tick the countdown reaches zero.
    pub fn tick(&mut self) -> bool {
        if !self.armed || self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    #[inline]
    pub const fn expired(&self) -> bool {
        self.armed && self.remaining == 0
    }

    #[inline]
    pub const fn running(&self) -> bool {
        self.armed && self.remaining > 0
    }

    #[inline]
    pub const fn remaining(&self) -> u16 {
        self.remaining
    }
}

/// Which countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Heater auto-restart after a fault.
    FaultRestart,
    PowerSupplyRamp,
    HeaterWarmUp,
}

impl TimerKind {
    pub const ALL: [Self; 3] = [Self::FaultRestart, Self::PowerSupplyRamp, Self::HeaterWarmUp];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    pub fault_restart: Countdown,
    pub power_supply_ramp: Countdown,
    pub heater_warm_up: Countdown,
}

impl Timers {
    pub const fn get(&self, kind: TimerKind) -> &Countdown {
        match kind {
            TimerKind::FaultRestart => &self.fault_restart,
            TimerKind::PowerSupplyRamp => &self.power_supply_ramp,
            TimerKind::HeaterWarmUp => &self.heater_warm_up,
        }
    }

    fn get_mut(&mut self, kind: TimerKind) -> &mut Countdown {
        match kind {
            TimerKind::FaultRestart => &mut self.fault_restart,
            TimerKind::PowerSupplyRamp => &mut self.power_supply_ramp,
            TimerKind::HeaterWarmUp => &mut self.heater_warm_up,
        }
    }
}

// ─── ControlPath ────────────────────────────────────────────────────

/// Writer view for the control (state-machine) role.
pub struct ControlPath<'a> {
    state: &'a mut GlobalControlState,
}

impl<'a> ControlPath<'a> {
    pub(crate) fn new(state: &'a mut GlobalControlState) -> Self {
        Self { state }
    }

    /// Enter `next`. The state message follows when the state has one of
    /// its own; otherwise the previous message stays.
    pub fn set_state(&mut self, next: ControlState) {
        let s = &mut *self.state;
        if s.control_state != next {
            info!(from = ?s.control_state, to = ?next, "control state");
        }
        s.control_state = next;
        if let Some(message) = next.message() {
            s.state_message = message;
        }
    }

    /// Latch `fault`. Returns true if the bit was newly set.
    pub fn latch_fault(&mut self, fault: Fault) -> bool {
        latch(self.state, fault)
    }

    /// Drop every latched fault.
    pub fn clear_faults(&mut self) {
        if !self.state.faults.is_empty() {
            info!(faults = ?self.state.faults, "faults cleared");
        }
        self.state.faults = FaultRegister::empty();
    }

    // ─── Timers ─────────────────────────────────────────────────────

    /// Load a countdown with its configured duration.
    pub fn start_timer(&mut self, kind: TimerKind) {
        let ticks = match kind {
            TimerKind::FaultRestart => self.state.settings.timing.heater_auto_restart_time,
            TimerKind::PowerSupplyRamp => self.state.settings.timing.power_supply_startup_time,
            TimerKind::HeaterWarmUp => self.state.settings.effective_heater_warm_up_time(),
        };
        self.state.timers.get_mut(kind).start(ticks);
    }

    pub fn stop_timer(&mut self, kind: TimerKind) {
        self.state.timers.get_mut(kind).stop();
    }

    #[inline]
    pub fn timer_expired(&self, kind: TimerKind) -> bool {
        self.state.timers.get(kind).expired()
    }

    /// Tick every countdown.
    pub fn service_timers(&mut self) {
        for kind in TimerKind::ALL {
            if self.state.timers.get_mut(kind).tick() {
                debug!(timer = ?kind, "countdown expired");
            }
        }
    }

    /// Wraps at `u16::MAX`.
    pub fn advance_run_time(&mut self) -> u16 {
        self.state.run_time_counter = self.state.run_time_counter.wrapping_add(1);
        self.state.run_time_counter
    }

    /// Act on a pending reset request: clear faults, restart trip and ADC
    /// error counting, drop the request. Returns true if a reset ran.
    ///
    /// Heater start attempts survive a reset.
    pub fn service_reset(&mut self) -> bool {
        if !self.state.reset_active {
            return false;
        }
        self.clear_faults();
        let s = &mut *self.state;
        s.inputs.reset_trips();
        s.adc_errors.reset_test();
        s.reset_active = false;
        s.ethernet_reset_cmd = false;
        true
    }

    // ─── Heater ─────────────────────────────────────────────────────

    /// One tick of heater regulation. Runs after
    /// [`drive_outputs`](Self::drive_outputs) so it sees this tick's heater
    /// enable.
    ///
    /// A newly enabled heater ramps from zero by `heater_ramp_up_increment`
    /// every `heater_ramp_up_time_period` ticks, holding while the heater
    /// current is above `max_heater_current_during_ramp_up`. At target the
    /// output steps down by `heater_regulation_increment` each regulation
    /// period while current limited and back up otherwise. Current-limited
    /// ticks count toward `HeaterVoltageCurrentLimited` once the warm-up
    /// holdoff has run out.
    pub fn regulate_heater(&mut self) -> HeaterPhase {
        if !self.state.outputs.heater_voltage.enabled() {
            self.stop_heater();
            return HeaterPhase::Off;
        }
        if self.state.heater.phase == HeaterPhase::Off && !self.start_heater() {
            return HeaterPhase::Off;
        }

        let s = &mut *self.state;
        let limited =
            s.inputs.htr_i_mon.value() > s.settings.limits.max_heater_current_during_ramp_up;
        let target = s.heater.voltage_target;
        if s.outputs.heater_voltage.value() > target {
            s.outputs.heater_voltage.mirror(target);
        }
        let phase = s.heater.phase;
        match phase {
            HeaterPhase::RampUp => self.ramp_heater(limited),
            HeaterPhase::Regulating => self.hold_heater_at_target(limited),
            HeaterPhase::Off => {}
        }
        self.state.heater.phase
    }

    /// Count one heater start attempt. Returns false once the configured
    /// maximum has been used up.
    fn record_heater_start(&mut self) -> bool {
        let s = &mut *self.state;
        s.heater.start_up_attempts = s.heater.start_up_attempts.saturating_add(1);
        s.heater.start_up_attempts <= s.settings.control.max_heater_start_up_attempts
    }

    fn start_heater(&mut self) -> bool {
        if !self.record_heater_start() {
            warn!(
                attempts = self.state.heater.start_up_attempts - 1,
                "heater start attempts used up"
            );
            self.set_state(ControlState::FaultHeaterFailure);
            let s = &mut *self.state;
            s.outputs.heater_voltage.set_enabled(false);
            s.dac_digital.heater_enable = DAC_DIGITAL_OFF;
            return false;
        }
        let s = &mut *self.state;
        s.heater.phase = HeaterPhase::RampUp;
        s.heater.ramp_interval = 0;
        s.heater.ramp_up_time = 0;
        s.outputs.heater_voltage.mirror(0);
        info!(
            target = s.heater.voltage_target,
            attempt = s.heater.start_up_attempts,
            "heater ramp-up"
        );
        true
    }

    fn stop_heater(&mut self) {
        let h = &mut self.state.heater;
        if h.phase != HeaterPhase::Off {
            debug!(phase = ?h.phase, "heater off");
        }
        h.phase = HeaterPhase::Off;
        h.ramp_interval = 0;
        h.ramp_up_time = 0;
        h.regulation_interval = 0;
        h.voltage_current_limited = 0;
        h.fault_holdoff_state = false;
        h.fault_holdoff_count = 0;
        self.state.outputs.heater_voltage.mirror(0);
    }

    fn ramp_heater(&mut self, limited: bool) {
        let s = &mut *self.state;
        let target = s.heater.voltage_target;
        if s.outputs.heater_voltage.value() >= target {
            self.finish_heater_ramp();
            return;
        }
        s.heater.ramp_up_time = s.heater.ramp_up_time.saturating_add(1);
        if s.heater.ramp_up_time > s.settings.timing.max_heater_ramp_up_time {
            latch(s, Fault::HeaterRampTimeout);
            return;
        }
        if limited {
            return;
        }
        s.heater.ramp_interval = s.heater.ramp_interval.saturating_add(1);
        if s.heater.ramp_interval < s.settings.timing.heater_ramp_up_time_period {
            return;
        }
        s.heater.ramp_interval = 0;
        let next = s
            .outputs
            .heater_voltage
            .value()
            .saturating_add(s.settings.control.heater_ramp_up_increment)
            .min(target);
        s.outputs.heater_voltage.mirror(next);
        if next >= target {
            self.finish_heater_ramp();
        }
    }

    fn finish_heater_ramp(&mut self) {
        let s = &mut *self.state;
        let holdoff = s
            .settings
            .timing
            .current_limited_fault_holdoff_time
            .saturating_mul(TICKS_PER_SECOND);
        let h = &mut s.heater;
        h.phase = HeaterPhase::Regulating;
        h.start_up_attempts = 0;
        h.regulation_interval = 0;
        h.voltage_current_limited = 0;
        h.fault_holdoff_state = holdoff > 0;
        h.fault_holdoff_count = holdoff;
        info!(
            voltage = s.outputs.heater_voltage.value(),
            holdoff, "heater at target"
        );
    }

    fn hold_heater_at_target(&mut self, limited: bool) {
        let s = &mut *self.state;
        let h = &mut s.heater;
        if h.fault_holdoff_state {
            h.fault_holdoff_count = h.fault_holdoff_count.saturating_sub(1);
            if h.fault_holdoff_count == 0 {
                h.fault_holdoff_state = false;
                debug!("heater current-limit holdoff over");
            }
        } else if limited {
            h.voltage_current_limited = h.voltage_current_limited.saturating_add(1);
        } else {
            h.voltage_current_limited = h.voltage_current_limited.saturating_sub(1);
        }
        let fault_time = s.settings.timing.heater_voltage_current_limited_fault_time;
        if h.voltage_current_limited > fault_time {
            latch(s, Fault::HeaterVoltageCurrentLimited);
        }

        s.heater.regulation_interval = s.heater.regulation_interval.saturating_add(1);
        if s.heater.regulation_interval < s.settings.timing.heater_regulation_time_period {
            return;
        }
        s.heater.regulation_interval = 0;
        let step = s.settings.control.heater_regulation_increment;
        let output = s.outputs.heater_voltage.value();
        let next = if limited {
            output.saturating_sub(step)
        } else {
            output.saturating_add(step).min(s.heater.voltage_target)
        };
        if next != output {
            debug!(from = output, to = next, limited, "heater regulation step");
            s.outputs.heater_voltage.mirror(next);
        }
    }

    // ─── Watchdog ───────────────────────────────────────────────────

    /// Check this tick's DAC-monitor readback, then advance the oscillator.
    /// Returns false on a mismatch (`SpiCommunication` latched). A tick whose
    /// ADC scan failed has no readback and is not checked.
    pub fn service_watchdog(&mut self) -> bool {
        let s = &mut *self.state;
        let readback = s.inputs.dac_monitor.raw();
        let ok = !s.adc_errors.read_ok() || s.watchdog.check(readback);
        if !ok {
            warn!(readback, mode = ?s.watchdog.mode(), "SPI watchdog readback out of window");
            latch(s, Fault::SpiCommunication);
        }
        if s.watchdog.advance() {
            debug!(mode = ?s.watchdog.mode(), "SPI watchdog toggled");
        }
        ok
    }

    // ─── Outputs ────────────────────────────────────────────────────

    /// Gate enables on requests, latched faults and the interlock, then
    /// refresh DAC digital codes and the monitor outputs.
    ///
    /// - heater: requested, no fault, heater starts not used up
    /// - HV: requested, no fault, interlock closed
    /// - top: follows HV
    /// - trigger: beam requested and top on
    pub fn drive_outputs(&mut self) {
        let s = &mut *self.state;
        let healthy = s.faults.is_empty();
        let interlock = s.discrete.interlock_relay_closed();

        let heater =
            s.requests.heater && healthy && s.control_state != ControlState::FaultHeaterFailure;
        let hv = s.requests.hv && healthy && interlock;
        let top = hv;
        let trigger = s.requests.beam && top;

        s.outputs.heater_voltage.set_enabled(heater);
        s.outputs.high_voltage.set_enabled(hv);
        s.outputs.top_voltage.set_enabled(top);

        let code = |on: bool| if on { DAC_DIGITAL_ON } else { DAC_DIGITAL_OFF };
        s.dac_digital.heater_enable = code(heater);
        s.dac_digital.hv_enable = code(hv);
        s.dac_digital.top_enable = code(top);
        s.dac_digital.trigger_enable = code(trigger);
        s.dac_digital.watchdog_oscillator = s.watchdog.value();

        let o = &mut s.outputs;
        o.monitor_heater_voltage.mirror(s.inputs.htr_v_mon.value());
        o.monitor_heater_current.mirror(s.inputs.htr_i_mon.value());
        o.monitor_cathode_voltage.mirror(s.inputs.hv_v_mon.value());
        o.monitor_grid_voltage.mirror(s.inputs.top_v_mon.value());
        for monitor in [
            &mut o.monitor_heater_voltage,
            &mut o.monitor_heater_current,
            &mut o.monitor_cathode_voltage,
            &mut o.monitor_grid_voltage,
        ] {
            monitor.set_enabled(true);
        }
    }
}

/// Shared by the sampling and control paths.
pub(crate) fn latch(state: &mut GlobalControlState, fault: Fault) -> bool {
    let fresh = state.faults.latch(fault);
    if fresh {
        warn!(?fault, bit = fault.bit(), "fault latched");
    }
    fresh
}
