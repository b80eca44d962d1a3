//! Pin capabilities beyond embedded-hal.
//!
//! embedded-hal covers plain outputs and PWM duty cycles. Changing a PWM
//! frequency and subscribing to input edges are board specific, so they
//! are expressed as small traits implemented by the board support code.

use core::convert::Infallible;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use crate::error::Result;

/// Handler invoked on a DIAG rising edge.
///
/// Runs in the interrupt/event context of the board support code and must
/// not block.
pub type DiagHandler = Box<dyn FnMut() + Send + 'static>;

/// DIAG input with edge detection.
pub trait DiagInterrupt {
    /// Replace any existing handler with `handler`, called on each rising edge.
    fn subscribe(&mut self, handler: DiagHandler) -> Result<()>;

    /// Remove the handler.
    fn unsubscribe(&mut self) -> Result<()>;
}

/// STEP output that can also generate a hardware PWM pulse train.
pub trait PwmStep: SetDutyCycle {
    /// Set the PWM frequency in Hz.
    fn set_frequency(&mut self, hz: u32) -> core::result::Result<(), Self::Error>;
}

/// Placeholder for a pin that is not wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Delay backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_std_delay_sleeps() {
        let start = Instant::now();
        StdDelay.delay_ms(5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_no_pin() {
        let mut pin = NoPin;
        assert!(pin.set_high().is_ok());
        assert!(pin.set_low().is_ok());
    }
}
