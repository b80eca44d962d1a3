//! Builder pattern for Tmc.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use tracing::info;

use crate::com::{NoBus, RegisterBus};
use crate::config::{validate_config, Chip, DriverConfig, Microsteps};
use crate::enable::EnablePin;
use crate::error::{ConfigError, Result};
use crate::gpio::{NoPin, StdDelay};
use crate::motion::{MotionWorker, StepDir};
use crate::reg::Registers;
use crate::stallguard::StallGuard;

use super::tmc::Tmc;

/// Builder for creating [`Tmc`] instances.
///
/// Every part is optional. Setting a part changes the builder's type, so
/// unused parts stay [`NoBus`] / [`NoPin`] placeholders.
///
/// ```rust,ignore
/// let mut tmc = TmcBuilder::new(Chip::Tmc2209)
///     .from_config(&config)?
///     .bus(TmcUart::new(serial, delay, config.driver_address).with_config(&config.uart))
///     .step_pin(step)
///     .dir_pin(dir)
///     .enable_pin(en)
///     .build()?;
/// ```
pub struct TmcBuilder<B, STEP, DIR, EN, D> {
    config: DriverConfig,
    bus: Option<B>,
    step_pin: Option<STEP>,
    dir_pin: Option<DIR>,
    enable_pin: Option<EN>,
    delay: D,
}

impl Default for TmcBuilder<NoBus, NoPin, NoPin, NoPin, StdDelay> {
    fn default() -> Self {
        Self::new(Chip::default())
    }
}

impl TmcBuilder<NoBus, NoPin, NoPin, NoPin, StdDelay> {
    /// Create a builder for `chip` with default settings and no parts.
    pub fn new(chip: Chip) -> Self {
        Self {
            config: DriverConfig {
                chip,
                ..DriverConfig::default()
            },
            bus: None,
            step_pin: None,
            dir_pin: None,
            enable_pin: None,
            delay: StdDelay,
        }
    }
}

impl<B, STEP, DIR, EN, D> TmcBuilder<B, STEP, DIR, EN, D> {
    /// Set the register bus.
    pub fn bus<B2>(self, bus: B2) -> TmcBuilder<B2, STEP, DIR, EN, D> {
        TmcBuilder {
            config: self.config,
            bus: Some(bus),
            step_pin: self.step_pin,
            dir_pin: self.dir_pin,
            enable_pin: self.enable_pin,
            delay: self.delay,
        }
    }

    /// Set the STEP pin.
    pub fn step_pin<S2>(self, pin: S2) -> TmcBuilder<B, S2, DIR, EN, D> {
        TmcBuilder {
            config: self.config,
            bus: self.bus,
            step_pin: Some(pin),
            dir_pin: self.dir_pin,
            enable_pin: self.enable_pin,
            delay: self.delay,
        }
    }

    /// Set the DIR pin.
    pub fn dir_pin<D2>(self, pin: D2) -> TmcBuilder<B, STEP, D2, EN, D> {
        TmcBuilder {
            config: self.config,
            bus: self.bus,
            step_pin: self.step_pin,
            dir_pin: Some(pin),
            enable_pin: self.enable_pin,
            delay: self.delay,
        }
    }

    /// Set the EN pin.
    pub fn enable_pin<E2>(self, pin: E2) -> TmcBuilder<B, STEP, DIR, E2, D> {
        TmcBuilder {
            config: self.config,
            bus: self.bus,
            step_pin: self.step_pin,
            dir_pin: self.dir_pin,
            enable_pin: Some(pin),
            delay: self.delay,
        }
    }

    /// Set the delay provider. Defaults to [`StdDelay`].
    pub fn delay<D2>(self, delay: D2) -> TmcBuilder<B, STEP, DIR, EN, D2> {
        TmcBuilder {
            config: self.config,
            bus: self.bus,
            step_pin: self.step_pin,
            dir_pin: self.dir_pin,
            enable_pin: self.enable_pin,
            delay,
        }
    }

    /// Set the chip family.
    pub fn chip(mut self, chip: Chip) -> Self {
        self.config.chip = chip;
        self
    }

    /// Set microstep resolution.
    pub fn microsteps(mut self, microsteps: Microsteps) -> Self {
        self.config.motor.microsteps = microsteps;
        self
    }

    /// Set full steps per revolution.
    pub fn fullsteps_per_rev(mut self, fullsteps: u16) -> Self {
        self.config.motor.fullsteps_per_rev = fullsteps;
        self
    }

    /// Set max speed in full steps per second.
    pub fn max_speed_fullstep(mut self, speed: f64) -> Self {
        self.config.motor.max_speed_fullstep = speed;
        self
    }

    /// Set acceleration in full steps per second squared.
    pub fn acceleration_fullstep(mut self, acceleration: f64) -> Self {
        self.config.motor.acceleration_fullstep = acceleration;
        self
    }

    /// Set direction inversion of the DIR pin.
    pub fn invert_direction(mut self, invert: bool) -> Self {
        self.config.motor.invert_direction = invert;
        self
    }

    /// Set the EN pin active level.
    pub fn enable_active_low(mut self, active_low: bool) -> Self {
        self.config.enable.active_low = active_low;
        self
    }

    /// Set the STEP pulse width.
    pub fn step_pulse_ns(mut self, ns: u32) -> Self {
        self.config.timing.step_pulse_ns = ns;
        self
    }

    /// Configure from a DriverConfig, chip included.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the configuration is inconsistent.
    pub fn from_config(mut self, config: &DriverConfig) -> Result<Self> {
        validate_config(config)?;
        self.config = config.clone();
        Ok(self)
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl<B, STEP, DIR, EN, D> TmcBuilder<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin + Send + 'static,
    DIR: OutputPin + Send + 'static,
    EN: OutputPin,
    D: DelayNs + Clone + Send + 'static,
{
    /// Build the Tmc. No bus traffic happens here; call
    /// [`Tmc::apply_config`] to write the motor settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or only one of the
    /// STEP and DIR pins is set.
    pub fn build(self) -> Result<Tmc<B, STEP, DIR, EN, D>> {
        validate_config(&self.config)?;
        let config = self.config;
        let motor = config.motor.clone();

        let regs = self.bus.map(|bus| {
            let mut regs = Registers::new(bus, config.chip);
            regs.set_write_tries(config.uart.write_tries);
            regs.into_shared()
        });
        let stallguard = regs
            .as_ref()
            .map(|_| StallGuard::new(config.stallguard.clone()));

        let motion = match (self.step_pin, self.dir_pin) {
            (Some(step_pin), Some(dir_pin)) => {
                let mut engine = StepDir::new(
                    step_pin,
                    dir_pin,
                    self.delay.clone(),
                    motor.max_speed(),
                    motor.acceleration(),
                );
                engine.set_step_pulse_ns(config.timing.step_pulse_ns);
                engine.set_invert_direction(motor.invert_direction);
                engine.set_microsteps(motor.microsteps.value());
                Some(MotionWorker::new(engine))
            }
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingPart("dir_pin").into()),
            (None, Some(_)) => return Err(ConfigError::MissingPart("step_pin").into()),
        };

        let enable = self
            .enable_pin
            .map(|pin| EnablePin::with_active_low(pin, config.enable.active_low));

        info!(
            chip = config.chip.name(),
            bus = regs.is_some(),
            step_dir = motion.is_some(),
            enable_pin = enable.is_some(),
            "driver initialized"
        );

        let mut tmc = Tmc::new(
            config.chip,
            regs,
            motion,
            enable,
            stallguard,
            self.delay,
            motor,
        );
        tmc.set_vactual_poll_interval_ms(config.timing.vactual_poll_ms);
        Ok(tmc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::motion::MovementPhase;
    use crate::test_util::{FastDelay, MapBus};

    #[test]
    fn test_builder_missing_dir_pin() {
        let result = TmcBuilder::new(Chip::Tmc2209)
            .step_pin(NoPin)
            .delay(FastDelay)
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingPart("dir_pin")))
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_speed() {
        let result = TmcBuilder::new(Chip::Tmc2209)
            .step_pin(NoPin)
            .dir_pin(NoPin)
            .max_speed_fullstep(0.0)
            .delay(FastDelay)
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidMaxSpeed(_)))
        ));
    }

    #[test]
    fn test_builder_applies_motor_settings() {
        let tmc = TmcBuilder::new(Chip::Tmc2209)
            .step_pin(NoPin)
            .dir_pin(NoPin)
            .microsteps(Microsteps::EIGHTH)
            .max_speed_fullstep(250.0)
            .acceleration_fullstep(1_000.0)
            .delay(FastDelay)
            .build()
            .unwrap();

        assert_eq!(tmc.max_speed().unwrap(), 2_000.0);
        assert_eq!(tmc.acceleration_fullstep().unwrap(), 1_000.0);
        assert_eq!(tmc.steps_per_rev(), 1_600);
        assert_eq!(tmc.movement_phase().unwrap(), MovementPhase::Standstill);
        assert!(tmc.registers().is_none());
        assert!(tmc.stallguard().is_none());
    }

    #[test]
    fn test_builder_from_config() {
        let config = crate::config::parse_config(
            r#"
            chip = "tmc2240"

            [motor]
            microsteps = 4
            max_speed_fullstep = 300.0

            [uart]
            write_tries = 3
            "#,
        )
        .unwrap();

        let tmc = TmcBuilder::default()
            .from_config(&config)
            .unwrap()
            .bus(MapBus::default())
            .delay(FastDelay)
            .build()
            .unwrap();

        assert_eq!(tmc.chip(), Chip::Tmc2240);
        assert_eq!(tmc.motor_config().microsteps, Microsteps::QUARTER);
        assert!(tmc.stallguard().is_some());
    }
}
