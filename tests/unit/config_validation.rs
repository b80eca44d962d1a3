//! Unit tests for configuration validation.

use tmc_driver::config::{validate_config, DriverConfig};
use tmc_driver::error::{ConfigError, Error};

/// Test validation of the default configuration.
#[test]
fn test_default_config_passes_validation() {
    assert!(validate_config(&DriverConfig::default()).is_ok());
}

/// Test validation fails for an out-of-range node address.
#[test]
fn test_invalid_driver_address() {
    let config = DriverConfig {
        driver_address: 7,
        ..DriverConfig::default()
    };

    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidDriverAddress(7)))
    ));
}

/// Test validation fails for a negative homing speed.
#[test]
fn test_invalid_homing_speed() {
    let mut config = DriverConfig::default();
    config.motor.max_speed_homing_fullstep = -5.0;

    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidMaxSpeed(_)))
    ));
}

/// Test validation fails for a StallGuard window larger than the warm-up.
#[test]
fn test_invalid_stall_window() {
    let toml_str = r#"
[stallguard]
window = 30
min_samples = 10
"#;

    let config: DriverConfig = toml::from_str(toml_str).expect("Failed to parse TOML");

    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidStallWindow {
            window: 30,
            min_samples: 10
        }))
    ));
}
