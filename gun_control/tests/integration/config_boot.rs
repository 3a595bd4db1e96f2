//! Boot from a TOML file the way the binary does.

use std::io::Write;

use gun_common::config::{ConfigError, ConfigLoader};
use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::ControlSource;
use gun_control::command::{Command, CommandError};
use tempfile::NamedTempFile;

use super::{runner, ticks};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn modbus_mode_config_boots_and_arbitrates() {
    let file = write_config(
        r#"
[interface]
ethernet = false
modbus_monitor = false
modbus = true

[modbus]
slave_address = 9
"#,
    );
    let config = BoardConfig::load(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.modbus.slave_address, 9);

    let mut r = runner(&config);
    ticks(&mut r, 3);
    let mut state = r.shared().lock();
    assert!(
        state
            .command()
            .apply(ControlSource::Modbus, Command::HeaterEnable(true))
            .is_ok()
    );
    assert_eq!(
        state
            .command()
            .apply(ControlSource::Ethernet, Command::HeaterEnable(true)),
        Err(CommandError::ControlNotPermitted {
            origin: ControlSource::Ethernet
        })
    );
}

#[test]
fn invalid_config_is_rejected_before_boot() {
    let file = write_config(
        r#"
[limits]
hv_min_set = 20000
hv_max_set = 1000
"#,
    );
    let config = BoardConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
