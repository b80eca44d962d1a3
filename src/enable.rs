//! Motor output enable control.

use embedded_hal::digital::OutputPin;
use tracing::info;

use crate::error::{MotionError, Result};

/// Something that can switch the motor power stage on and off.
pub trait EnableControl {
    /// Enable or disable the motor outputs.
    fn set_motor_enabled(&mut self, enabled: bool) -> Result<()>;
}

/// EN pin with configurable active level.
///
/// TMC drivers enable their outputs while EN is low, so `active_low` is the
/// default.
#[derive(Debug)]
pub struct EnablePin<P> {
    pin: P,
    active_low: bool,
    enabled: Option<bool>,
}

impl<P: OutputPin> EnablePin<P> {
    /// Create an active-low EN pin.
    pub fn new(pin: P) -> Self {
        Self::with_active_low(pin, true)
    }

    /// Create an EN pin with an explicit active level.
    pub fn with_active_low(pin: P, active_low: bool) -> Self {
        Self {
            pin,
            active_low,
            enabled: None,
        }
    }

    /// Last state written, if any.
    pub fn is_enabled(&self) -> Option<bool> {
        self.enabled
    }

    /// Release the pin.
    pub fn release(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> EnableControl for EnablePin<P> {
    fn set_motor_enabled(&mut self, enabled: bool) -> Result<()> {
        let level_high = enabled != self.active_low;
        if level_high {
            self.pin.set_high().map_err(|_| MotionError::PinError)?;
        } else {
            self.pin.set_low().map_err(|_| MotionError::PinError)?;
        }
        self.enabled = Some(enabled);
        info!(enabled, "motor output");
        Ok(())
    }
}
