//! Trapezoidal ramp.
//!
//! Step intervals follow the square-root acceleration law used by
//! AccelStepper: each interval is derived from the previous one and a step
//! counter `n`, so acceleration is computed per step instead of per time
//! slice. A negative `n` means the ramp is decelerating.

use libm::{floor, sqrt};

/// Direction of motor motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Clockwise (positive step count).
    Clockwise,
    /// Counter-clockwise (negative step count).
    CounterClockwise,
}

impl Direction {
    /// Get direction from signed step count.
    #[inline]
    pub fn from_steps(steps: i64) -> Self {
        if steps >= 0 {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        }
    }

    /// Get the sign multiplier.
    #[inline]
    pub fn sign(self) -> i64 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }
}

/// Current phase of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementPhase {
    /// Not moving.
    #[default]
    Standstill,
    /// Speeding up toward max speed.
    Accelerating,
    /// Running at max speed.
    MaxSpeed,
    /// Slowing down toward the target.
    Decelerating,
}

impl MovementPhase {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            MovementPhase::Standstill => 0,
            MovementPhase::Accelerating => 1,
            MovementPhase::MaxSpeed => 2,
            MovementPhase::Decelerating => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => MovementPhase::Accelerating,
            2 => MovementPhase::MaxSpeed,
            3 => MovementPhase::Decelerating,
            _ => MovementPhase::Standstill,
        }
    }
}

/// How a position argument is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementAbsRel {
    /// Target is an absolute position.
    Absolute,
    /// Target is relative to the current position.
    #[default]
    Relative,
}

/// Why a movement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// The ramp reached its target.
    #[default]
    NoStop,
    /// Decelerated to a standstill on request.
    SoftStop,
    /// Stopped immediately on request.
    HardStop,
}

impl StopMode {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            StopMode::NoStop => 0,
            StopMode::SoftStop => 1,
            StopMode::HardStop => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => StopMode::SoftStop,
            2 => StopMode::HardStop,
            _ => StopMode::NoStop,
        }
    }
}

/// Ramp state of one axis, in µsteps.
#[derive(Debug, Clone)]
pub struct Ramp {
    current_pos: i64,
    target_pos: i64,
    /// Signed speed in steps/s.
    speed: f64,
    max_speed: f64,
    acceleration: f64,
    /// Step counter of the current ramp segment.
    n: i64,
    /// Initial interval (µs).
    c0: f64,
    /// Last interval (µs).
    cn: f64,
    /// Interval at max speed (µs).
    cmin: f64,
    /// Interval until the next step, 0 when standing still.
    step_interval_us: f64,
    direction: Direction,
    phase: MovementPhase,
    stopping: bool,
}

impl Ramp {
    /// Create a ramp at position 0.
    ///
    /// Non-positive speeds and accelerations are rejected by config
    /// validation. Here they are clamped to a tiny positive value.
    pub fn new(max_speed: f64, acceleration: f64) -> Self {
        let mut ramp = Self {
            current_pos: 0,
            target_pos: 0,
            speed: 0.0,
            max_speed: 1.0,
            acceleration: 1.0,
            n: 0,
            c0: 0.0,
            cn: 0.0,
            cmin: 1_000_000.0,
            step_interval_us: 0.0,
            direction: Direction::Clockwise,
            phase: MovementPhase::Standstill,
            stopping: false,
        };
        ramp.set_max_speed(max_speed);
        ramp.set_acceleration(acceleration);
        ramp
    }

    /// Current position.
    #[inline]
    pub fn current_pos(&self) -> i64 {
        self.current_pos
    }

    /// Redefine the current position. Also stops the ramp.
    pub fn set_current_pos(&mut self, pos: i64) {
        self.current_pos = pos;
        self.target_pos = pos;
        self.n = 0;
        self.speed = 0.0;
        self.step_interval_us = 0.0;
        self.phase = MovementPhase::Standstill;
        self.stopping = false;
    }

    /// Target position.
    #[inline]
    pub fn target_pos(&self) -> i64 {
        self.target_pos
    }

    /// Steps left to the target.
    #[inline]
    pub fn distance_to_go(&self) -> i64 {
        self.target_pos - self.current_pos
    }

    /// Signed speed in steps/s.
    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Current direction.
    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Current phase.
    #[inline]
    pub fn phase(&self) -> MovementPhase {
        self.phase
    }

    /// Interval until the next step in µs, 0 when the ramp is done.
    #[inline]
    pub fn step_interval_us(&self) -> f64 {
        self.step_interval_us
    }

    /// Max speed in steps/s.
    #[inline]
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    /// Acceleration in steps/s².
    #[inline]
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Whether a soft stop is in progress.
    #[inline]
    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Set max speed. Takes effect on the next step when moving.
    pub fn set_max_speed(&mut self, speed: f64) {
        let speed = speed.abs().max(f64::MIN_POSITIVE);
        if speed == self.max_speed {
            return;
        }
        self.max_speed = speed;
        self.cmin = 1_000_000.0 / speed;
        if self.n > 0 {
            self.n = self.steps_to_stop();
            self.compute_new_speed();
        }
    }

    /// Set acceleration. Takes effect on the next step when moving.
    pub fn set_acceleration(&mut self, acceleration: f64) {
        let acceleration = acceleration.abs();
        if acceleration == 0.0 || (acceleration == self.acceleration && self.c0 > 0.0) {
            return;
        }
        self.n = (self.n as f64 * (self.acceleration / acceleration)) as i64;
        self.c0 = 0.676 * sqrt(2.0 / acceleration) * 1_000_000.0;
        self.acceleration = acceleration;
        if self.n != 0 {
            self.compute_new_speed();
        }
    }

    /// Set a new target and compute the first interval.
    pub fn move_to(&mut self, target: i64) {
        self.stopping = false;
        self.target_pos = target;
        self.compute_new_speed();
    }

    /// Set a target relative to the current position.
    pub fn move_by(&mut self, steps: i64) {
        self.move_to(self.current_pos.saturating_add(steps));
    }

    /// Record one emitted step in the current direction.
    #[inline]
    pub fn advance(&mut self) {
        self.current_pos += self.direction.sign();
    }

    fn steps_to_stop(&self) -> i64 {
        floor(self.speed * self.speed / (2.0 * self.acceleration)) as i64
    }

    /// Decelerate to a standstill as fast as the acceleration allows.
    pub fn soft_stop(&mut self) {
        if self.speed == 0.0 {
            return;
        }
        let steps = self.steps_to_stop();
        self.target_pos = if self.speed > 0.0 {
            self.current_pos + steps
        } else {
            self.current_pos - steps
        };
        self.stopping = true;
        if self.n > 0 {
            self.n = -steps;
        }
        self.compute_new_speed();
    }

    /// Stop at the current position without deceleration.
    pub fn hard_stop(&mut self) {
        self.target_pos = self.current_pos;
        self.speed = 0.0;
        self.n = 0;
        self.step_interval_us = 0.0;
        self.phase = MovementPhase::Standstill;
        self.stopping = false;
    }

    /// Compute the interval until the next step.
    ///
    /// Returns the interval in µs, 0 once the target is reached.
    pub fn compute_new_speed(&mut self) -> f64 {
        let distance_to = self.distance_to_go();
        let steps_to_stop = self.steps_to_stop();

        if distance_to == 0 && steps_to_stop <= 1 {
            self.step_interval_us = 0.0;
            self.speed = 0.0;
            self.n = 0;
            self.phase = MovementPhase::Standstill;
            self.stopping = false;
            return 0.0;
        }

        if distance_to > 0 {
            if self.n > 0 {
                if steps_to_stop >= distance_to || self.direction == Direction::CounterClockwise {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0
                && !self.stopping
                && steps_to_stop < distance_to
                && self.direction == Direction::Clockwise
            {
                self.n = -self.n;
            }
        } else if distance_to < 0 {
            if self.n > 0 {
                if steps_to_stop >= -distance_to || self.direction == Direction::Clockwise {
                    self.n = -steps_to_stop;
                }
            } else if self.n < 0
                && !self.stopping
                && steps_to_stop < -distance_to
                && self.direction == Direction::CounterClockwise
            {
                self.n = -self.n;
            }
        }

        let previous = self.cn;
        if self.n == 0 {
            self.cn = self.c0.max(self.cmin);
            self.direction = Direction::from_steps(distance_to);
        } else {
            self.cn -= (2.0 * self.cn) / ((4 * self.n + 1) as f64);
            self.cn = self.cn.max(self.cmin);
            if self.stopping {
                self.cn = self.cn.max(previous);
            }
        }

        let decelerating = self.n < 0;
        self.n += 1;
        self.step_interval_us = self.cn;
        self.speed = 1_000_000.0 / self.cn * self.direction.sign() as f64;

        self.phase = if decelerating {
            MovementPhase::Decelerating
        } else if self.cn <= self.cmin {
            MovementPhase::MaxSpeed
        } else {
            MovementPhase::Accelerating
        };

        self.step_interval_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Step the ramp to completion, returning the phases seen.
    fn run(ramp: &mut Ramp, limit: usize) -> Vec<MovementPhase> {
        let mut phases = Vec::new();
        let mut steps = 0;
        while ramp.step_interval_us() > 0.0 && steps < limit {
            phases.push(ramp.phase());
            ramp.advance();
            ramp.compute_new_speed();
            steps += 1;
        }
        phases
    }

    #[test]
    fn test_initial_interval() {
        let mut ramp = Ramp::new(250.0, 1000.0);
        ramp.move_to(200);

        // c0 = 0.676 * sqrt(2 / 1000) * 1e6
        assert!((ramp.step_interval_us() - 30_231.4).abs() < 1.0);
        assert_eq!(ramp.phase(), MovementPhase::Accelerating);
        assert_eq!(ramp.direction(), Direction::Clockwise);
    }

    #[test]
    fn test_trapezoid_reaches_target() {
        let mut ramp = Ramp::new(250.0, 1000.0);
        ramp.move_to(200);
        let phases = run(&mut ramp, 10_000);

        assert_eq!(ramp.current_pos(), 200);
        assert_eq!(ramp.phase(), MovementPhase::Standstill);
        assert_eq!(ramp.speed(), 0.0);
        assert!(phases.contains(&MovementPhase::Accelerating));
        assert!(phases.contains(&MovementPhase::MaxSpeed));
        assert!(phases.contains(&MovementPhase::Decelerating));

        // accelerate, cruise, decelerate in that order
        let first_max = phases.iter().position(|p| *p == MovementPhase::MaxSpeed).unwrap();
        let first_dec = phases
            .iter()
            .position(|p| *p == MovementPhase::Decelerating)
            .unwrap();
        assert!(first_max < first_dec);
        assert!(phases[..first_max]
            .iter()
            .all(|p| *p == MovementPhase::Accelerating));
    }

    #[test]
    fn test_triangle_profile() {
        // too short to reach max speed
        let mut ramp = Ramp::new(10_000.0, 1000.0);
        ramp.move_to(100);
        let phases = run(&mut ramp, 10_000);

        assert_eq!(ramp.current_pos(), 100);
        assert!(!phases.contains(&MovementPhase::MaxSpeed));
    }

    #[test]
    fn test_negative_move() {
        let mut ramp = Ramp::new(500.0, 2000.0);
        ramp.move_by(-150);
        assert_eq!(ramp.direction(), Direction::CounterClockwise);
        assert!(ramp.speed() < 0.0);
        run(&mut ramp, 10_000);
        assert_eq!(ramp.current_pos(), -150);
    }

    #[test]
    fn test_zero_move() {
        let mut ramp = Ramp::new(500.0, 2000.0);
        ramp.move_by(0);
        assert_eq!(ramp.step_interval_us(), 0.0);
        assert_eq!(ramp.phase(), MovementPhase::Standstill);
    }

    #[test]
    fn test_hard_stop() {
        let mut ramp = Ramp::new(1000.0, 5000.0);
        ramp.move_to(1000);
        run(&mut ramp, 50);
        ramp.hard_stop();

        assert_eq!(ramp.target_pos(), ramp.current_pos());
        assert_eq!(ramp.speed(), 0.0);
        assert_eq!(ramp.phase(), MovementPhase::Standstill);
        assert_eq!(ramp.compute_new_speed(), 0.0);
    }

    #[test]
    fn test_soft_stop_never_speeds_up() {
        let mut ramp = Ramp::new(1000.0, 5000.0);
        ramp.move_to(10_000);
        run(&mut ramp, 200);
        let stopped_at = ramp.current_pos();
        let mut last = ramp.speed().abs();

        ramp.soft_stop();
        assert!(ramp.is_stopping());
        assert!(ramp.target_pos() >= stopped_at);

        while ramp.step_interval_us() > 0.0 {
            assert!(ramp.speed().abs() <= last + 1e-9);
            last = ramp.speed().abs();
            ramp.advance();
            ramp.compute_new_speed();
        }
        assert!(ramp.current_pos() < 10_000);
        assert_eq!(ramp.phase(), MovementPhase::Standstill);
    }

    #[test]
    fn test_set_current_pos() {
        let mut ramp = Ramp::new(1000.0, 5000.0);
        ramp.move_to(100);
        ramp.set_current_pos(42);
        assert_eq!(ramp.current_pos(), 42);
        assert_eq!(ramp.distance_to_go(), 0);
        assert_eq!(ramp.speed(), 0.0);
    }

    #[test]
    fn test_lower_max_speed_while_moving() {
        let mut ramp = Ramp::new(2000.0, 4000.0);
        ramp.move_to(5000);
        run(&mut ramp, 500);
        ramp.set_max_speed(500.0);
        run(&mut ramp, 200);
        assert!(ramp.speed().abs() <= 500.0 * (1.0 + 1e-9));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_max_speed(
            steps in -2000i64..2000,
            max_speed in 10.0f64..5000.0,
            acceleration in 10.0f64..20_000.0,
        ) {
            let mut ramp = Ramp::new(max_speed, acceleration);
            ramp.move_by(steps);
            let mut count = 0;
            while ramp.step_interval_us() > 0.0 && count < 100_000 {
                prop_assert!(ramp.speed().abs() <= max_speed * (1.0 + 1e-9));
                ramp.advance();
                ramp.compute_new_speed();
                count += 1;
            }
            prop_assert_eq!(ramp.current_pos(), steps);
        }
    }
}
