//! Modbus requests against the live control state.

use gun_common::consts::DAC_DIGITAL_ON;
use gun_common::gun::config::BoardConfig;
use gun_common::gun::fault::Fault;
use gun_common::gun::interface::{ControlSource, InterfaceModes};
use gun_common::gun::state::ControlState;
use gun_common::modbus::consts::{COIL_ON, ExceptionCode, FunctionCode};
use gun_common::modbus::crc::check_crc;
use gun_control::board::DacChannel;
use gun_control::modbus::shadow::{bits, holding, input};

use super::{request, runner, ticks, transact, words};

fn exception_of(response: &[u8]) -> Option<ExceptionCode> {
    if response[1] & 0x80 == 0 {
        return None;
    }
    ExceptionCode::from_u8(response[2])
}

#[test]
fn input_registers_reflect_the_tick() {
    let mut r = runner(&BoardConfig::default());
    ticks(&mut r, 5);

    let frame = request(FunctionCode::ReadInputRegisters, input::STATE_MESSAGE, 4);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert!(check_crc(&response));
    let regs = words(&response);
    assert_eq!(regs.len(), 4);
    assert_eq!(regs[1], ControlState::default().code());
    assert_eq!(regs[2], 0, "no faults");

    let frame = request(FunctionCode::ReadInputRegisters, input::RUN_TIME, 1);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(words(&response), vec![5]);
}

#[test]
fn ethernet_master_turns_hv_on() {
    let mut r = runner(&BoardConfig::default());

    let frame = request(FunctionCode::WriteRegister, holding::HV_REFERENCE, 12_000);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(&response[..], &frame[..], "write echoes the request");

    let frame = request(FunctionCode::WriteBit, bits::HV_ENABLE, COIL_ON);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(&response[..], &frame[..]);

    ticks(&mut r, 10);
    assert_eq!(r.board().dac_code(DacChannel::HvEnable), DAC_DIGITAL_ON);
    assert_eq!(r.board().dac_code(DacChannel::HighVoltage), 36_000);

    let frame = request(FunctionCode::ReadRegisters, holding::HV_REFERENCE, 1);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(words(&response), vec![12_000]);
    let frame = request(FunctionCode::ReadBits, bits::HEATER_ENABLE, 4);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(response[2], 1, "one data byte");
    assert_eq!(response[3], 0b0010, "only HV requested");
}

#[test]
fn monitor_only_source_gets_device_failure() {
    let r = runner(&BoardConfig::default());
    let frame = request(FunctionCode::WriteBit, bits::HEATER_ENABLE, COIL_ON);
    let response = transact(&r, ControlSource::Modbus, &frame).unwrap();
    assert_eq!(response[1], FunctionCode::exception(FunctionCode::WriteBit.code()));
    assert_eq!(exception_of(&response), Some(ExceptionCode::DeviceFailure));
    assert!(!r.shared().lock().requests().heater);
}

#[test]
fn modbus_reads_follow_the_monitor_mode() {
    let r = runner(&BoardConfig::default());
    let frame = request(FunctionCode::ReadInputRegisters, input::FAULTS, 1);
    let response = transact(&r, ControlSource::Modbus, &frame).unwrap();
    assert_eq!(exception_of(&response), None);
    assert_eq!(words(&response), vec![0]);

    let config = BoardConfig {
        interface: InterfaceModes {
            modbus_monitor: false,
            ..InterfaceModes::default()
        },
        ..BoardConfig::default()
    };
    let r = runner(&config);
    let response = transact(&r, ControlSource::Modbus, &frame).unwrap();
    assert_eq!(exception_of(&response), Some(ExceptionCode::DeviceFailure));
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(exception_of(&response), None);
}

#[test]
fn out_of_range_reference_is_illegal_value() {
    let r = runner(&BoardConfig::default());
    let frame = request(FunctionCode::WriteRegister, holding::HV_REFERENCE, 20_001);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(exception_of(&response), Some(ExceptionCode::IllegalValue));
    assert_eq!(r.shared().lock().outputs().high_voltage.value(), 0);
}

#[test]
fn unmapped_write_is_illegal_address() {
    let r = runner(&BoardConfig::default());
    let frame = request(FunctionCode::WriteRegister, holding::END, 1);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(exception_of(&response), Some(ExceptionCode::IllegalAddress));

    let frame = request(FunctionCode::WriteBit, bits::FAULTS, COIL_ON);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(exception_of(&response), Some(ExceptionCode::IllegalAddress));
}

#[test]
fn fault_bits_and_reset_over_modbus() {
    let mut r = runner(&BoardConfig::default());
    r.shared().lock().control().latch_fault(Fault::FpgaPrf);
    r.tick();

    let fault_bit = bits::FAULTS + Fault::FpgaPrf.bit() as u16;
    let frame = request(FunctionCode::ReadBits, fault_bit, 1);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(response[3], 1);

    let frame = request(FunctionCode::WriteBit, bits::RESET, COIL_ON);
    transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert!(r.shared().lock().ethernet_reset_cmd());
    r.tick();

    let frame = request(FunctionCode::ReadBits, fault_bit, 1);
    let response = transact(&r, ControlSource::Ethernet, &frame).unwrap();
    assert_eq!(response[3], 0);
}

#[test]
fn corrupted_frame_is_not_answered() {
    let r = runner(&BoardConfig::default());
    let mut frame = request(FunctionCode::ReadInputRegisters, 0, 1);
    frame[7] ^= 0xFF;
    assert!(transact(&r, ControlSource::Ethernet, &frame).is_none());

    let mut foreign = request(FunctionCode::ReadInputRegisters, 0, 1);
    foreign[0] = 0x01;
    assert!(transact(&r, ControlSource::Ethernet, &foreign).is_none());
}
