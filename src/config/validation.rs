//! Configuration validation.

use crate::error::{ConfigError, Error, Result};
use crate::stallguard::HISTORY_CAPACITY;

use super::{DriverConfig, MotorConfig, StallGuardConfig};

/// Validate a driver configuration.
///
/// Checks:
/// - Driver address is 0-3
/// - Speeds and accelerations are positive
/// - The StallGuard averaging window fits the sample history
pub fn validate_config(config: &DriverConfig) -> Result<()> {
    if config.driver_address > 3 {
        return Err(Error::Config(ConfigError::InvalidDriverAddress(
            config.driver_address,
        )));
    }

    validate_motor(&config.motor)?;
    validate_stallguard(&config.stallguard)?;

    Ok(())
}

fn validate_motor(motor: &MotorConfig) -> Result<()> {
    if motor.max_speed_fullstep <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxSpeed(
            motor.max_speed_fullstep,
        )));
    }

    if motor.max_speed_homing_fullstep <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxSpeed(
            motor.max_speed_homing_fullstep,
        )));
    }

    if motor.acceleration_fullstep <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidAcceleration(
            motor.acceleration_fullstep,
        )));
    }

    Ok(())
}

pub(crate) fn validate_stallguard(sg: &StallGuardConfig) -> Result<()> {
    if sg.window == 0 || sg.window > HISTORY_CAPACITY || (sg.min_samples as usize) < sg.window {
        return Err(Error::Config(ConfigError::InvalidStallWindow {
            window: sg.window,
            min_samples: sg.min_samples,
        }));
    }

    Ok(())
}
