//! STEP/DIR motion engine.
//!
//! Generic over embedded-hal 1.0 pin and delay types. Steps are emitted on
//! the calling thread; run it through [`MotionWorker`](super::MotionWorker)
//! for background execution.

use std::time::Instant;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use libm::round;
use tracing::{debug, info, trace};

use crate::error::{MotionError, Result};
use crate::gpio::PwmStep;

use super::profile::{Direction, MovementAbsRel, MovementPhase, Ramp, StopMode};
use super::shared::MotionHandle;
use super::{resolve_target, MotionControl, StepObserver};

/// Default STEP pulse width. The chips need 100 ns.
pub const DEFAULT_STEP_PULSE_NS: u32 = 1_000;

/// Ramped STEP/DIR pulse generator.
///
/// Generic over:
/// - `STEP`: STEP pin type (must implement `OutputPin`, and `PwmStep` for
///   the PWM operations)
/// - `DIR`: DIR pin type (must implement `OutputPin`)
/// - `DELAY`: Delay provider (must implement `DelayNs`)
pub struct StepDir<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// STEP pin (pulse to move one µstep).
    step_pin: STEP,

    /// DIR pin (high = CW unless inverted).
    dir_pin: DIR,

    /// Delay provider for step timing.
    delay: DELAY,

    ramp: Ramp,
    handle: MotionHandle,

    /// Current direction (cached to avoid unnecessary pin writes).
    current_direction: Option<Direction>,

    invert_direction: bool,
    step_pulse_ns: u32,
    movement_abs_rel: MovementAbsRel,

    /// µsteps per full step, for full step speeds.
    microsteps: u16,
}

impl<STEP, DIR, DELAY> StepDir<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Create an engine at position 0.
    pub fn new(
        step_pin: STEP,
        dir_pin: DIR,
        delay: DELAY,
        max_speed: f64,
        acceleration: f64,
    ) -> Self {
        Self {
            step_pin,
            dir_pin,
            delay,
            ramp: Ramp::new(max_speed, acceleration),
            handle: MotionHandle::new(),
            current_direction: None,
            invert_direction: false,
            step_pulse_ns: DEFAULT_STEP_PULSE_NS,
            movement_abs_rel: MovementAbsRel::default(),
            microsteps: 1,
        }
    }

    /// Set STEP pulse width.
    pub fn set_step_pulse_ns(&mut self, ns: u32) {
        self.step_pulse_ns = ns.max(100);
    }

    /// Set direction inversion.
    pub fn set_invert_direction(&mut self, invert: bool) {
        self.invert_direction = invert;
        self.current_direction = None;
    }

    /// Set the µsteps per full step used by full step speeds.
    pub fn set_microsteps(&mut self, microsteps: u16) {
        self.microsteps = microsteps.max(1);
    }

    /// Ramp state.
    #[inline]
    pub fn ramp(&self) -> &Ramp {
        &self.ramp
    }

    /// Release the pins and the delay provider.
    pub fn release(self) -> (STEP, DIR, DELAY) {
        (self.step_pin, self.dir_pin, self.delay)
    }

    /// Drive the DIR pin. Only writes when the direction changes.
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        if self.current_direction == Some(direction) {
            return Ok(());
        }

        let pin_high = match direction {
            Direction::Clockwise => !self.invert_direction,
            Direction::CounterClockwise => self.invert_direction,
        };

        if pin_high {
            self.dir_pin.set_high().map_err(|_| MotionError::PinError)?;
        } else {
            self.dir_pin.set_low().map_err(|_| MotionError::PinError)?;
        }

        trace!(?direction, "direction");
        self.current_direction = Some(direction);
        Ok(())
    }

    /// Emit one STEP pulse.
    pub fn make_a_step(&mut self) -> Result<()> {
        self.step_pin.set_high().map_err(|_| MotionError::PinError)?;
        self.delay.delay_ns(self.step_pulse_ns);
        self.step_pin.set_low().map_err(|_| MotionError::PinError)?;
        Ok(())
    }

    fn publish(&self) {
        self.handle.publish(
            self.ramp.current_pos(),
            self.ramp.target_pos(),
            self.ramp.speed(),
            self.ramp.phase(),
        );
    }

    fn run_loop(&mut self, observer: &mut dyn StepObserver) -> Result<StopMode> {
        let mut outcome = StopMode::NoStop;
        let pulse_us = self.step_pulse_ns as f64 / 1_000.0;

        loop {
            match self.handle.take_stop() {
                StopMode::NoStop => {}
                StopMode::SoftStop => {
                    if outcome == StopMode::NoStop {
                        outcome = StopMode::SoftStop;
                    }
                    self.ramp.soft_stop();
                }
                StopMode::HardStop => {
                    outcome = StopMode::HardStop;
                    self.ramp.hard_stop();
                }
            }
            self.publish();

            if self.ramp.step_interval_us() <= 0.0 {
                break;
            }

            self.set_direction(self.ramp.direction())?;
            self.make_a_step()?;
            self.ramp.advance();
            self.publish();
            trace!(pos = self.ramp.current_pos(), speed = self.ramp.speed(), "step");

            // time spent in the observer counts towards the step interval
            let observed = Instant::now();
            if let Some(mode) = observer.on_step(&self.handle.snapshot())? {
                self.handle.stop(mode);
            }
            let observer_us = observed.elapsed().as_secs_f64() * 1e6;

            let interval_us = self.ramp.compute_new_speed();
            let remaining_us = interval_us - pulse_us - observer_us;
            if interval_us > 0.0 && remaining_us > 0.0 {
                self.delay.delay_us(round(remaining_us) as u32);
            }
        }

        Ok(outcome)
    }
}

impl<STEP, DIR, DELAY> MotionControl for StepDir<STEP, DIR, DELAY>
where
    STEP: OutputPin,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    fn handle(&self) -> &MotionHandle {
        &self.handle
    }

    fn current_pos(&self) -> i64 {
        self.ramp.current_pos()
    }

    fn set_current_pos(&mut self, pos: i64) {
        self.ramp.set_current_pos(pos);
        self.publish();
    }

    fn max_speed(&self) -> f64 {
        self.ramp.max_speed()
    }

    fn set_max_speed(&mut self, speed: f64) {
        debug!(speed, "max speed");
        self.ramp.set_max_speed(speed);
    }

    fn acceleration(&self) -> f64 {
        self.ramp.acceleration()
    }

    fn set_acceleration(&mut self, acceleration: f64) {
        debug!(acceleration, "acceleration");
        self.ramp.set_acceleration(acceleration);
    }

    fn movement_abs_rel(&self) -> MovementAbsRel {
        self.movement_abs_rel
    }

    fn set_movement_abs_rel(&mut self, mode: MovementAbsRel) {
        self.movement_abs_rel = mode;
    }

    fn prepare_move(&mut self, steps: i64, abs_rel: Option<MovementAbsRel>) -> Result<()> {
        self.handle.take_stop();
        let mode = abs_rel.unwrap_or(self.movement_abs_rel);
        let target = resolve_target(self.ramp.current_pos(), steps, mode);
        info!(from = self.ramp.current_pos(), to = target, "move");
        self.ramp.move_to(target);
        self.publish();
        Ok(())
    }

    fn run_prepared(&mut self, observer: &mut dyn StepObserver) -> Result<StopMode> {
        let result = self.run_loop(observer);
        if result.is_err() {
            self.ramp.hard_stop();
            self.publish();
        }
        match &result {
            Ok(mode) => info!(pos = self.ramp.current_pos(), stop = ?mode, "move finished"),
            Err(e) => info!(pos = self.ramp.current_pos(), "move aborted: {}", e),
        }
        result
    }
}

impl<STEP, DIR, DELAY> StepDir<STEP, DIR, DELAY>
where
    STEP: OutputPin + PwmStep,
    DIR: OutputPin,
    DELAY: DelayNs,
{
    /// Run continuously at `speed` µsteps/s using hardware PWM on STEP.
    ///
    /// The sign selects the direction. A speed of 0 stops the output.
    /// Positions are not tracked while the PWM runs.
    pub fn run_speed_pwm(&mut self, speed: f64) -> Result<()> {
        if speed == 0.0 {
            return self.stop_pwm();
        }

        let direction = if speed > 0.0 {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        };
        self.set_direction(direction)?;

        let hz = (round(speed.abs()) as u32).max(1);
        self.step_pin
            .set_frequency(hz)
            .map_err(|_| MotionError::PinError)?;
        self.step_pin
            .set_duty_cycle_percent(50)
            .map_err(|_| MotionError::PinError)?;

        debug!(hz, ?direction, "pwm running");
        self.handle.publish(
            self.ramp.current_pos(),
            self.ramp.current_pos(),
            speed,
            MovementPhase::MaxSpeed,
        );
        Ok(())
    }

    /// Run continuously at `speed` full steps/s using hardware PWM on STEP.
    pub fn run_speed_pwm_fullstep(&mut self, speed: f64) -> Result<()> {
        self.run_speed_pwm(speed * self.microsteps as f64)
    }

    /// Stop the PWM output.
    pub fn stop_pwm(&mut self) -> Result<()> {
        self.step_pin
            .set_duty_cycle_fully_off()
            .map_err(|_| MotionError::PinError)?;
        debug!("pwm stopped");
        self.publish();
        Ok(())
    }
}
