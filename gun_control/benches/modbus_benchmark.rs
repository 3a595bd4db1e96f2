//! Modbus benchmark: request handling against the live shadow map, and one
//! full tick body for comparison against the 10 ms budget.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::ControlSource;
use gun_common::modbus::consts::{FunctionCode, MODBUS_SLAVE_ADDR};
use gun_control::board::simulation::SimulationBoard;
use gun_control::modbus::frame::Request;
use gun_control::modbus::shadow::{self, holding, input};
use gun_control::modbus::{ControlShadow, ModbusSlave};
use gun_control::state::GlobalControlState;
use gun_control::tick::TickRunner;

fn frame(function: FunctionCode, address: u16, value: u16) -> [u8; 8] {
    Request {
        slave: MODBUS_SLAVE_ADDR,
        function,
        address,
        value,
    }
    .encode()
}

fn bench_requests(c: &mut Criterion) {
    let mut group = c.benchmark_group("modbus_request");

    let config = BoardConfig::default();
    let mut state = GlobalControlState::new(&config);
    shadow::refresh(&mut state);
    let mut slave = ModbusSlave::new(MODBUS_SLAVE_ADDR);

    for (name, request) in [
        ("read_inputs", frame(FunctionCode::ReadInputRegisters, 0, input::END)),
        ("read_bits", frame(FunctionCode::ReadBits, 0, 48)),
        ("write_reference", frame(FunctionCode::WriteRegister, holding::HV_REFERENCE, 10_000)),
    ] {
        group.bench_with_input(BenchmarkId::new("handle", name), &request, |b, request| {
            b.iter(|| {
                let mut map = ControlShadow::new(&mut state, ControlSource::Ethernet);
                black_box(slave.handle(black_box(request), &mut map))
            });
        });
    }

    group.finish();
}

fn bench_tick(c: &mut Criterion) {
    let config = BoardConfig::default();
    let mut runner = TickRunner::with_config(SimulationBoard::new(&config), &config);
    if let Err(e) = runner.init() {
        panic!("simulation board init: {e}");
    }

    c.bench_function("tick_body", |b| b.iter(|| runner.tick()));
}

criterion_group!(benches, bench_requests, bench_tick);
criterion_main!(benches);
