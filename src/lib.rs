//! # tmc-driver
//!
//! Control of Trinamic TMC2209 and TMC2240 stepper drivers with
//! embedded-hal 1.0 pins and embedded-io serial ports.
//!
//! ## Features
//!
//! - **Register access**: UART (TMC2209) and SPI (TMC2240) transports behind
//!   one cached register model with named bit fields
//! - **STEP/DIR motion**: trapezoidal acceleration ramp, run on the calling
//!   thread or on a background worker
//! - **VACTUAL motion**: internal step generator of the TMC2209 with soft ramps
//! - **StallGuard**: DIAG interrupt or register polling, sensorless homing
//!   and CoolStep
//! - **Configuration-driven**: driver, motor and timing settings from TOML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tmc_driver::{Chip, Microsteps, TmcBuilder, TmcUart};
//!
//! let config = tmc_driver::load_config("driver.toml")?;
//!
//! let mut tmc = TmcBuilder::new(Chip::Tmc2209)
//!     .from_config(&config)?
//!     .bus(TmcUart::new(serial, delay, config.driver_address).with_config(&config.uart))
//!     .step_pin(step_pin)
//!     .dir_pin(dir_pin)
//!     .enable_pin(en_pin)
//!     .build()?;
//!
//! tmc.apply_config()?;
//! tmc.set_motor_enabled(true)?;
//! tmc.run_to_position_revolutions(1.0, None)?;
//! tmc.shutdown()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]

pub mod com;
pub mod config;
pub mod driver;
pub mod enable;
pub mod error;
pub mod gpio;
pub mod math;
pub mod motion;
pub mod reg;
pub mod stallguard;

#[cfg(test)]
mod test_util;

pub use com::{NoBus, RegisterBus, TmcSpi, TmcUart};
pub use config::{
    load_config, parse_config, validate_config, Chip, DriverConfig, Microsteps, MotorConfig,
};
pub use driver::{Tmc, TmcBuilder, TmcParts};
pub use enable::{EnableControl, EnablePin};
pub use error::{Error, Result};
pub use gpio::{DiagInterrupt, NoPin, StdDelay};
pub use motion::{
    Direction, MotionHandle, MovementAbsRel, MovementPhase, StepDir, StopMode, VActual,
};
pub use stallguard::{CoolStepConfig, StallGuard, StallGuardPoller};
