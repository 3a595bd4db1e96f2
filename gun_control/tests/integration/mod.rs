//! Shared fixtures for the integration tests.

mod command_path;
mod config_boot;
mod modbus_slave;
mod tick_cycle;

use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::ControlSource;
use gun_common::modbus::consts::FunctionCode;
use gun_control::board::simulation::SimulationBoard;
use gun_control::modbus::frame::{Frame, Request};
use gun_control::modbus::{ControlShadow, ModbusSlave};
use gun_control::tick::TickRunner;

/// Initialised runner over a simulated board.
pub(crate) fn runner(config: &BoardConfig) -> TickRunner<SimulationBoard> {
    let mut runner = TickRunner::with_config(SimulationBoard::new(config), config);
    runner.init().expect("simulation board init");
    runner
}

pub(crate) fn ticks(runner: &mut TickRunner<SimulationBoard>, n: usize) {
    for _ in 0..n {
        runner.tick();
    }
}

pub(crate) fn request(function: FunctionCode, address: u16, value: u16) -> [u8; 8] {
    Request {
        slave: gun_common::modbus::consts::MODBUS_SLAVE_ADDR,
        function,
        address,
        value,
    }
    .encode()
}

/// One request through a fresh slave against the runner's live state.
pub(crate) fn transact(
    runner: &TickRunner<SimulationBoard>,
    source: ControlSource,
    frame: &[u8],
) -> Option<Frame> {
    let mut slave = ModbusSlave::new(gun_common::modbus::consts::MODBUS_SLAVE_ADDR);
    let mut state = runner.shared().lock();
    let mut map = ControlShadow::new(&mut state, source);
    slave.handle(frame, &mut map)
}

/// Register words of a read response (CRC already checked by the caller).
pub(crate) fn words(response: &[u8]) -> Vec<u16> {
    let count = usize::from(response[2]);
    response[3..3 + count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}
