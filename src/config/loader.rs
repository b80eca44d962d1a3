//! Configuration loading from files.

use std::fs;
use std::path::Path;

use crate::error::{name, ConfigError, Error, Result};

use super::DriverConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
///
/// # Example
///
/// ```rust,ignore
/// use tmc_driver::load_config;
///
/// let config = load_config("tmc2209.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DriverConfig> {
    let content = fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(ConfigError::IoError(name(&e.to_string()))))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is invalid or fails validation.
pub fn parse_config(content: &str) -> Result<DriverConfig> {
    let config: DriverConfig = toml::from_str(content)
        .map_err(|e| Error::Config(ConfigError::ParseError(name(e.message()))))?;

    super::validation::validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chip, Microsteps};

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chip, Chip::Tmc2209);
        assert_eq!(config.motor.fullsteps_per_rev, 200);
        assert_eq!(config.stallguard.window, 6);
        assert_eq!(config.stallguard.min_samples, 20);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
chip = "tmc2240"
driver_address = 1

[motor]
fullsteps_per_rev = 400
microsteps = 2
run_current_ma = 300
max_speed_fullstep = 250.0
acceleration_fullstep = 1000.0
spreadcycle = true

[enable]
active_low = false

[stallguard]
threshold = 80
window = 8
min_samples = 32

[uart]
read_tries = 3
local_echo = false
"#;

        let config = parse_config(toml).unwrap();
        assert_eq!(config.chip, Chip::Tmc2240);
        assert_eq!(config.driver_address, 1);
        assert_eq!(config.motor.microsteps, Microsteps::HALF);
        assert_eq!(config.motor.steps_per_rev(), 800);
        assert!(config.motor.spreadcycle);
        assert!(!config.enable.active_low);
        assert_eq!(config.stallguard.threshold, 80);
        assert_eq!(config.uart.read_tries, 3);
        assert_eq!(config.uart.write_tries, 10);
        assert!(!config.uart.local_echo);
    }

    #[test]
    fn test_invalid_microsteps_rejected() {
        let toml = r#"
[motor]
microsteps = 3
"#;
        assert!(matches!(
            parse_config(toml),
            Err(Error::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/tmc.toml"),
            Err(Error::Config(ConfigError::IoError(_)))
        ));
    }
}
