//! Configuration module for tmc-driver.
//!
//! Provides types for loading and validating driver configurations
//! from TOML files or pre-parsed data.

mod driver;
mod loader;
pub mod units;
mod validation;

pub use driver::{
    Chip, DriverConfig, EnableConfig, MotorConfig, StallGuardConfig, TimingConfig, UartConfig,
};
pub use loader::{load_config, parse_config};
pub use validation::validate_config;

pub(crate) use validation::validate_stallguard;

pub use units::Microsteps;
