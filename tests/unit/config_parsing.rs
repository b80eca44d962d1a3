//! Unit tests for TOML configuration parsing.

use tmc_driver::config::{load_config, parse_config, Chip, DriverConfig, Microsteps};

/// Test parsing a complete TMC2209 configuration.
#[test]
fn test_parse_driver_config() {
    let toml_str = r#"
chip = "tmc2209"
driver_address = 1

[motor]
fullsteps_per_rev = 400
microsteps = 8
run_current_ma = 1200
hold_current_multiplier = 0.3
max_speed_fullstep = 250.0
acceleration_fullstep = 1000.0
spreadcycle = true
invert_direction = true

[enable]
active_low = false

[uart]
read_tries = 3
local_echo = false

[timing]
vactual_poll_ms = 10
"#;

    let config = parse_config(toml_str).expect("Failed to parse TOML");

    assert_eq!(config.chip, Chip::Tmc2209);
    assert_eq!(config.driver_address, 1);
    assert_eq!(config.motor.fullsteps_per_rev, 400);
    assert_eq!(config.motor.microsteps, Microsteps::EIGHTH);
    assert_eq!(config.motor.run_current_ma, 1200);
    assert_eq!(config.motor.steps_per_rev(), 3200);
    assert_eq!(config.motor.max_speed(), 2000.0);
    assert!(config.motor.spreadcycle);
    assert!(config.motor.invert_direction);
    assert!(!config.enable.active_low);
    assert_eq!(config.uart.read_tries, 3);
    assert!(!config.uart.local_echo);
    assert_eq!(config.uart.write_tries, 10);
    assert_eq!(config.timing.vactual_poll_ms, 10);
}

/// Test that omitted sections fall back to defaults.
#[test]
fn test_parse_defaults() {
    let config: DriverConfig = toml::from_str("chip = \"tmc2240\"").expect("Failed to parse TOML");

    assert_eq!(config.chip, Chip::Tmc2240);
    assert_eq!(config.motor.microsteps, Microsteps::SIXTEENTH);
    assert_eq!(config.motor.hold_current_multiplier, 0.5);
    assert!(config.enable.active_low);
    assert_eq!(config.stallguard.threshold, 100);
}

/// Test that an unknown chip name is rejected.
#[test]
fn test_parse_unknown_chip() {
    assert!(parse_config("chip = \"tmc5160\"").is_err());
}

/// Test that invalid microsteps are rejected at parse time.
#[test]
fn test_parse_invalid_microsteps() {
    let toml_str = r#"
[motor]
microsteps = 12
"#;

    assert!(parse_config(toml_str).is_err());
}

/// Test loading configuration from a file.
#[test]
fn test_load_config_file() {
    let path = std::env::temp_dir().join(format!("tmc-driver-{}.toml", std::process::id()));
    std::fs::write(&path, "[stallguard]\nthreshold = 42\n").expect("Failed to write file");

    let config = load_config(&path);
    std::fs::remove_file(&path).ok();

    assert_eq!(config.expect("Failed to load").stallguard.threshold, 42);
}

/// Test that a missing file reports an I/O error.
#[test]
fn test_load_missing_file() {
    assert!(load_config("/nonexistent/tmc-driver.toml").is_err());
}
