//! Board-wide constants for the A37474-000 gun driver.
//!
//! Single source of truth for tick timing, converter-logic-board interface
//! values and the defaults that seed [`BoardConfig`](crate::gun::config::BoardConfig).
//! All timer values are in 10 ms tick units unless stated otherwise.

/// Control tick period [µs] (10 ms).
pub const TICK_TIME_US: u64 = 10_000;

/// Control ticks per second.
pub const TICKS_PER_SECOND: u16 = (1_000_000 / TICK_TIME_US) as u16;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gun_driver/a37474.toml";

/// Service name used in logs.
pub const SERVICE_NAME: &str = "a37474";

// ─── Converter Logic Board: SPI watchdog ────────────────────────────

/// Watchdog test mode 0 identifier.
pub const WATCHDOG_MODE_0: u16 = 10;
/// Watchdog test mode 1 identifier.
pub const WATCHDOG_MODE_1: u16 = 20;
/// DAC value written in watchdog mode 0 (12801).
pub const WATCHDOG_VALUE_0: u16 = 0x3201;
/// DAC value written in watchdog mode 1 (52798).
pub const WATCHDOG_VALUE_1: u16 = 0xCE3E;
/// Ticks between watchdog mode changes (800 ms).
pub const WATCHDOG_MAX_COUNT: u16 = 80;
/// Accepted readback window for mode 0.
pub const MIN_WD_VALUE_0: u16 = 0x2202;
pub const MAX_WD_VALUE_0: u16 = 0x4200;
/// Accepted readback window for mode 1.
pub const MIN_WD_VALUE_1: u16 = 0xBE3F;
pub const MAX_WD_VALUE_1: u16 = 0xDE3D;

/// DAC code for a digital output that is off.
pub const DAC_DIGITAL_OFF: u16 = 0x0000;
/// DAC code for a digital output that is on.
pub const DAC_DIGITAL_ON: u16 = 0xFFFF;

/// ADC code at or above which a digital fault line reads high.
pub const ADC_DATA_DIGITAL_HIGH: u16 = 0x0800;

/// Cable delay applied before FPGA reads [µs].
pub const DELAY_FPGA_CABLE_DELAY_US: u32 = 10;

// ─── Revision targets ───────────────────────────────────────────────

pub const TARGET_CUSTOMER_HARDWARE_REV: u8 = 0b00_0100;
pub const TARGET_FPGA_FIRMWARE_MAJOR_REV: u8 = 0b0001;
pub const TARGET_FPGA_FIRMWARE_MINOR_REV: u8 = 0b00_0010;
/// 'B'
pub const TARGET_FPGA_FIRMWARE_REV: u8 = 0x42;
/// 'A'
pub const INTERFACE_HARDWARE_REV: u8 = 0x41;

/// CAN register: reset the gun-driver FPGA.
pub const ETM_CAN_REGISTER_GUN_DRIVER_RESET_FPGA: u16 = 0x8202;

// ─── Timers (10 ms units) ───────────────────────────────────────────

pub const HEATER_AUTO_RESTART_TIME: u16 = 500;
pub const GUN_DRIVER_POWER_SUPPLY_STARTUP_TIME: u16 = 100;
pub const HEATER_REGULATION_TIME_PERIOD: u16 = 5;
/// Heater warm-up when the ECB enforces it over CAN.
pub const HEATER_WARM_UP_TIME_CAN: u16 = 100;
/// Heater warm-up for every other control mode (1 minute).
pub const HEATER_WARM_UP_TIME: u16 = 6000;
/// 7 minutes.
pub const MAX_HEATER_RAMP_UP_TIME: u16 = 42_000;
/// 710 ms between heater ramp increments.
pub const HEATER_RAMP_UP_TIME_PERIOD: u16 = 71;
/// 5 seconds.
pub const HEATER_VOLTAGE_CURRENT_LIMITED_FAULT_TIME: u16 = 500;
/// Seconds at the start of heater warm-up before current-limited time
/// is counted.
pub const CURRENT_LIMITED_FAULT_HOLDOFF_TIME: u16 = 10;

// ─── System control parameters ──────────────────────────────────────

pub const MAX_CONVERTER_LOGIC_ADC_READ_ERRORS: u16 = 20;
pub const MAX_HEATER_START_UP_ATTEMPTS: u16 = 5;
pub const MAX_DAC_TX_ATTEMPTS: u16 = 10;
/// [mV]
pub const HEATER_RAMP_UP_INCREMENT: u16 = 10;
/// [mV]
pub const HEATER_REGULATION_INCREMENT: u16 = 50;

// ─── Board limits (A37474-000) ──────────────────────────────────────

/// 8 V limit on what the customer can program [mV].
pub const MAX_PROGRAM_HTR_VOLTAGE: u16 = 8000;
pub const HEATER_VOLTAGE_MAX_SET_POINT: u16 = 8000;
pub const HEATER_VOLTAGE_MIN_SET_POINT: u16 = 0;
/// Heater current above which the heater voltage is held or stepped down [mA].
pub const MAX_HEATER_CURRENT_DURING_RAMP_UP: u16 = 1420;
/// [mA]
pub const HTR_OC_ABS: u16 = 1600;
/// Heater current below which a heater at its set-point counts as open [mA].
pub const HTR_UC_ABS: u16 = 200;
/// -20 kV.
pub const HV_MAX_SET_BOARD_SPEC: u16 = 20_000;
pub const HV_MIN_SET_BOARD_SPEC: u16 = 0;
/// 140 V.
pub const TOP_MAX_SET_BOARD_SPEC: u16 = 22_000;
/// -80 V.
pub const TOP_MIN_SET_BOARD_SPEC: u16 = 0;
/// -180 V.
pub const BIAS_OVER_VOLTAGE: u16 = 18_000;
/// -140 V.
pub const BIAS_UNDER_VOLTAGE: u16 = 14_000;

// ─── Network defaults ───────────────────────────────────────────────

/// 192.168.70.15, packed little-endian as the TCP stack stores it.
pub const DEFAULT_REMOTE_IP_ADDRESS: u32 = 0x0F46_A8C0;
/// 192.168.70.99, packed little-endian.
pub const DEFAULT_IP_ADDRESS: u32 = 0x6346_A8C0;
/// Modbus/TCP well-known port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// UART1 baud rate for the Modbus RTU link.
pub const UART1_BAUDRATE: u32 = 19_200;

/// Decode a little-endian packed IPv4 address.
pub const fn ip_from_packed(packed: u32) -> std::net::Ipv4Addr {
    let b = packed.to_le_bytes();
    std::net::Ipv4Addr::new(b[0], b[1], b[2], b[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn packed_ip_defaults_decode() {
        assert_eq!(ip_from_packed(DEFAULT_IP_ADDRESS), Ipv4Addr::new(192, 168, 70, 99));
        assert_eq!(
            ip_from_packed(DEFAULT_REMOTE_IP_ADDRESS),
            Ipv4Addr::new(192, 168, 70, 15)
        );
    }

    #[test]
    fn watchdog_values_inside_their_windows() {
        assert!((MIN_WD_VALUE_0..=MAX_WD_VALUE_0).contains(&WATCHDOG_VALUE_0));
        assert!((MIN_WD_VALUE_1..=MAX_WD_VALUE_1).contains(&WATCHDOG_VALUE_1));
        assert!(MAX_WD_VALUE_0 < MIN_WD_VALUE_1);
    }

    #[test]
    fn board_limits_are_ordered() {
        assert!(HV_MIN_SET_BOARD_SPEC < HV_MAX_SET_BOARD_SPEC);
        assert!(TOP_MIN_SET_BOARD_SPEC < TOP_MAX_SET_BOARD_SPEC);
        assert!(MAX_PROGRAM_HTR_VOLTAGE <= HEATER_VOLTAGE_MAX_SET_POINT);
        assert!(BIAS_UNDER_VOLTAGE < BIAS_OVER_VOLTAGE);
    }
}
