//! Command sources end to end: discrete pins, CAN references, arbitration.

use gun_common::consts::{DAC_DIGITAL_OFF, DAC_DIGITAL_ON};
use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::{ConfigReceived, ControlSource, InterfaceModes};
use gun_control::board::{DacChannel, DiscreteInputs};
use gun_control::command::{Command, CommandError, Reference};

use super::{runner, ticks};

fn pins(hv: bool, beam: bool) -> DiscreteInputs {
    DiscreteInputs {
        customer_hv_on: hv,
        customer_beam_enable: beam,
        interlock_relay_closed: true,
    }
}

#[test]
fn discrete_pins_drive_the_board() {
    let config = BoardConfig {
        interface: InterfaceModes {
            discrete: true,
            ..InterfaceModes::default()
        },
        ..BoardConfig::default()
    };
    let mut r = runner(&config);
    r.board_mut().set_discrete(pins(true, true));
    ticks(&mut r, 10);

    for channel in [
        DacChannel::HeaterEnable,
        DacChannel::HvEnable,
        DacChannel::TopEnable,
        DacChannel::TriggerEnable,
    ] {
        assert_eq!(r.board().dac_code(channel), DAC_DIGITAL_ON, "{channel:?}");
    }

    // Releasing the HV pin drops HV and requests a reset once debounced.
    r.board_mut().set_discrete(pins(false, false));
    ticks(&mut r, 10);
    assert_eq!(r.board().dac_code(DacChannel::HvEnable), DAC_DIGITAL_OFF);
    assert_eq!(r.board().dac_code(DacChannel::TriggerEnable), DAC_DIGITAL_OFF);
    assert_eq!(r.board().dac_code(DacChannel::HeaterEnable), DAC_DIGITAL_ON);
    assert!(!r.shared().lock().reset_active(), "reset serviced");
}

#[test]
fn can_references_fill_control_config_without_the_lock() {
    let config = BoardConfig {
        interface: InterfaceModes {
            can: true,
            ethernet: false,
            modbus_monitor: false,
            ..InterfaceModes::default()
        },
        ..BoardConfig::default()
    };
    let r = runner(&config);
    let shared = r.shared();
    assert_eq!(shared.control_config(), ConfigReceived::empty());

    for (reference, value) in [
        (Reference::HighVoltage, 10_000),
        (Reference::PulseTop, 11_000),
        (Reference::Heater, 6_000),
    ] {
        shared
            .lock()
            .command()
            .apply(ControlSource::Can, Command::SetPoint(reference, value))
            .unwrap();
    }
    assert!(shared.control_config().complete());

    let state = shared.lock();
    assert_eq!(state.references().can.heater, 6_000);
    assert_eq!(state.references().ethernet.heater, 0);
    assert_eq!(state.outputs().top_voltage.value(), 11_000);
}

#[test]
fn last_permitted_writer_wins() {
    let config = BoardConfig {
        interface: InterfaceModes {
            modbus: true,
            ..InterfaceModes::default()
        },
        ..BoardConfig::default()
    };
    let r = runner(&config);
    let mut state = r.shared().lock();
    let mut command = state.command();
    command
        .apply(ControlSource::Ethernet, Command::SetPoint(Reference::HighVoltage, 5_000))
        .unwrap();
    command
        .apply(ControlSource::Modbus, Command::SetPoint(Reference::HighVoltage, 7_000))
        .unwrap();
    assert_eq!(
        command.apply(ControlSource::Can, Command::SetPoint(Reference::HighVoltage, 9_000)),
        Err(CommandError::ReferenceNotPermitted {
            origin: ControlSource::Can
        })
    );
    drop(command);

    assert_eq!(state.outputs().high_voltage.value(), 7_000);
    assert_eq!(state.references().ethernet.high_voltage, 5_000);
    assert_eq!(state.references().modbus.high_voltage, 7_000);
}
