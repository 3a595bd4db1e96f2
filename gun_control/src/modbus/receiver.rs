//! RTU receive state machine.
//!
//! `Idle → Receiving → Processing → Transmitting → Idle`. Bytes arriving
//! while a frame is being processed or answered are dropped. A partial frame
//! that sees no new byte for `timeout_ticks` ticks is discarded.

use gun_common::modbus::consts::{ETMMODBUS_COMMAND_SIZE_MIN, MODBUS_200MS_DELAY, ReceiverState};
use heapless::Vec;
use tracing::debug;

pub type RequestBytes = [u8; ETMMODBUS_COMMAND_SIZE_MIN];

#[derive(Debug, Clone)]
pub struct RtuReceiver {
    state: ReceiverState,
    buf: Vec<u8, ETMMODBUS_COMMAND_SIZE_MIN>,
    idle_ticks: u16,
    timeout_ticks: u16,
    discarded: u32,
    dropped_bytes: u32,
}

impl Default for RtuReceiver {
    fn default() -> Self {
        Self::new(MODBUS_200MS_DELAY)
    }
}

impl RtuReceiver {
    pub fn new(timeout_ticks: u16) -> Self {
        Self {
            state: ReceiverState::Idle,
            buf: Vec::new(),
            idle_ticks: 0,
            timeout_ticks: timeout_ticks.max(1),
            discarded: 0,
            dropped_bytes: 0,
        }
    }

    /// Feed one received byte. Returns the request once eight bytes are in;
    /// the receiver then stays in `Processing` until
    /// [`begin_transmit`](Self::begin_transmit) or [`finish`](Self::finish).
    pub fn push(&mut self, byte: u8) -> Option<RequestBytes> {
        match self.state {
            ReceiverState::Processing | ReceiverState::Transmitting => {
                self.dropped_bytes = self.dropped_bytes.wrapping_add(1);
                return None;
            }
            ReceiverState::Idle => self.state = ReceiverState::Receiving,
            ReceiverState::Receiving => {}
        }
        self.idle_ticks = 0;
        // Never full here: a full buffer moves straight to Processing.
        let _ = self.buf.push(byte);
        if !self.buf.is_full() {
            return None;
        }
        let mut frame = [0u8; ETMMODBUS_COMMAND_SIZE_MIN];
        frame.copy_from_slice(&self.buf);
        self.buf.clear();
        self.state = ReceiverState::Processing;
        Some(frame)
    }

    /// One 10 ms tick without input. Returns true if a partial frame was
    /// discarded.
    pub fn tick(&mut self) -> bool {
        if self.state != ReceiverState::Receiving {
            return false;
        }
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks < self.timeout_ticks {
            return false;
        }
        debug!(bytes = self.buf.len(), "partial Modbus frame timed out");
        self.buf.clear();
        self.idle_ticks = 0;
        self.discarded = self.discarded.wrapping_add(1);
        self.state = ReceiverState::Idle;
        true
    }

    /// Response is going out.
    pub fn begin_transmit(&mut self) {
        if self.state == ReceiverState::Processing {
            self.state = ReceiverState::Transmitting;
        }
    }

    /// Response sent, or the frame was dropped. Back to idle.
    pub fn finish(&mut self) {
        self.buf.clear();
        self.idle_ticks = 0;
        self.state = ReceiverState::Idle;
    }

    #[inline]
    pub const fn state(&self) -> ReceiverState {
        self.state
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Partial frames dropped on timeout.
    #[inline]
    pub const fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Bytes ignored while busy.
    #[inline]
    pub const fn dropped_bytes(&self) -> u32 {
        self.dropped_bytes
    }
}
