//! Driver module for tmc-driver.
//!
//! Provides the [`Tmc`] facade, its builder and StallGuard homing.

mod builder;
mod homing;
mod tmc;

pub use builder::TmcBuilder;
pub use homing::{StallGuardMinima, HOMING_ACCELERATION};
pub use tmc::{Tmc, TmcParts, DEFAULT_TOFF};
