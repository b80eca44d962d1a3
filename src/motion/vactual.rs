//! Register-driven velocity (VACTUAL).
//!
//! The chip generates the steps itself. This engine only writes a velocity,
//! waits in poll ticks while watching the stop flag and writes 0 again.
//! Positions are estimated from the elapsed time.

use embedded_hal::delay::DelayNs;
use libm::round;
use tracing::{debug, info, warn};

use crate::com::RegisterBus;
use crate::error::Result;
use crate::math::{rps_to_vactual, vactual_to_rps};
use crate::reg::{lock, SharedRegisters};

use super::profile::{Direction, MovementAbsRel, MovementPhase, StopMode};
use super::shared::MotionHandle;
use super::{resolve_target, MotionControl, NoObserver, StepObserver};

/// Default interval between stop flag checks.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 50;

/// VACTUAL motion control over shared registers.
pub struct VActual<B, DELAY> {
    regs: SharedRegisters<B>,
    delay: DELAY,
    handle: MotionHandle,
    current_pos: i64,
    target_pos: i64,
    max_speed: f64,
    acceleration: f64,
    steps_per_rev: i64,
    poll_interval_ms: u32,
    movement_abs_rel: MovementAbsRel,
}

impl<B, DELAY> VActual<B, DELAY>
where
    B: RegisterBus,
    DELAY: DelayNs,
{
    /// Create a VACTUAL engine. `steps_per_rev` is in µsteps.
    pub fn new(regs: SharedRegisters<B>, delay: DELAY, steps_per_rev: i64, max_speed: f64) -> Self {
        Self {
            regs,
            delay,
            handle: MotionHandle::new(),
            current_pos: 0,
            target_pos: 0,
            max_speed: max_speed.abs(),
            acceleration: 0.0,
            steps_per_rev: steps_per_rev.max(1),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            movement_abs_rel: MovementAbsRel::default(),
        }
    }

    /// Use an existing handle, e.g. to share stop requests with a STEP/DIR
    /// engine of the same axis.
    pub fn with_handle(mut self, handle: MotionHandle) -> Self {
        self.handle = handle;
        self
    }

    /// Set the stop flag poll interval.
    pub fn set_poll_interval_ms(&mut self, ms: u32) {
        self.poll_interval_ms = ms.max(1);
    }

    /// Set µsteps per revolution, e.g. after a microstep change.
    pub fn set_steps_per_rev(&mut self, steps_per_rev: i64) {
        self.steps_per_rev = steps_per_rev.max(1);
    }

    /// Write VACTUAL. 0 hands motion back to the STEP input.
    pub fn set_vactual(&mut self, vactual: i32) -> Result<()> {
        debug!(vactual, "VACTUAL");
        lock(&self.regs)?.set_field("VACTUAL", "vactual", vactual)
    }

    /// Run at `vactual` for `duration_ms`, then write 0.
    ///
    /// A duration of 0 writes the velocity and returns immediately.
    pub fn set_vactual_dur(&mut self, vactual: i32, duration_ms: u64) -> Result<StopMode> {
        self.handle.take_stop();
        self.run_vactual(vactual, duration_ms, &mut NoObserver)
    }

    /// Run at `rps` for `revolutions`. 0 revolutions runs until told otherwise.
    pub fn set_vactual_rps(&mut self, rps: f64, revolutions: f64) -> Result<StopMode> {
        if rps == 0.0 {
            self.set_vactual(0)?;
            self.publish_standstill();
            return Ok(StopMode::NoStop);
        }

        let mut duration_ms = 0;
        let mut rps = rps;
        if revolutions != 0.0 {
            duration_ms = round((revolutions / rps).abs() * 1_000.0) as u64;
            if revolutions < 0.0 {
                rps = -rps;
            }
            self.target_pos = self.current_pos + round(revolutions * self.steps_per_rev as f64) as i64;
        }

        info!(rps, revolutions, "VACTUAL move");
        let target = self.target_pos;
        let outcome = self.set_vactual_dur(rps_to_vactual(rps, self.steps_per_rev), duration_ms)?;
        if outcome == StopMode::NoStop && duration_ms > 0 {
            self.set_current_pos(target);
        }
        Ok(outcome)
    }

    /// Run at `rpm` for `revolutions`, taking `|revolutions / rpm| · 60` s.
    pub fn set_vactual_rpm(&mut self, rpm: f64, revolutions: f64) -> Result<StopMode> {
        self.set_vactual_rps(rpm / 60.0, revolutions)
    }

    fn publish_standstill(&self) {
        self.handle
            .publish(self.current_pos, self.current_pos, 0.0, MovementPhase::Standstill);
    }

    /// Write `vactual`, then poll until `duration_ms` has passed or a stop
    /// is requested, and write 0 again. Error exits zero VACTUAL as well.
    fn run_vactual(
        &mut self,
        vactual: i32,
        duration_ms: u64,
        observer: &mut dyn StepObserver,
    ) -> Result<StopMode> {
        let result = self.spin(vactual, duration_ms, observer);
        if result.is_ok() && duration_ms == 0 {
            return result;
        }

        let stopped = self.set_vactual(0);
        self.target_pos = self.current_pos;
        self.publish_standstill();
        match (result, stopped) {
            (Ok(outcome), Ok(())) => {
                info!(pos = self.current_pos, stop = ?outcome, "VACTUAL finished");
                Ok(outcome)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    warn!("could not zero VACTUAL: {}", stop_err);
                }
                warn!(pos = self.current_pos, "VACTUAL move aborted: {}", e);
                Err(e)
            }
        }
    }

    fn spin(
        &mut self,
        vactual: i32,
        duration_ms: u64,
        observer: &mut dyn StepObserver,
    ) -> Result<StopMode> {
        self.set_vactual(vactual)?;
        if duration_ms == 0 {
            return Ok(StopMode::NoStop);
        }

        let speed = vactual_to_rps(vactual, self.steps_per_rev) * self.steps_per_rev as f64;
        let start = self.current_pos;
        self.handle
            .publish(start, self.target_pos, speed, MovementPhase::MaxSpeed);

        let mut elapsed_ms = 0u64;
        while elapsed_ms < duration_ms {
            let stop = self.handle.take_stop();
            if stop != StopMode::NoStop {
                debug!(elapsed_ms, "VACTUAL stop requested");
                return Ok(stop);
            }

            let tick = (self.poll_interval_ms as u64).min(duration_ms - elapsed_ms);
            self.delay.delay_ms(tick as u32);
            elapsed_ms += tick;

            self.current_pos = start + round(speed * elapsed_ms as f64 / 1_000.0) as i64;
            self.handle
                .publish(self.current_pos, self.target_pos, speed, MovementPhase::MaxSpeed);
            if let Some(mode) = observer.on_step(&self.handle.snapshot())? {
                self.handle.stop(mode);
            }
        }
        Ok(StopMode::NoStop)
    }
}

impl<B, DELAY> MotionControl for VActual<B, DELAY>
where
    B: RegisterBus,
    DELAY: DelayNs,
{
    fn handle(&self) -> &MotionHandle {
        &self.handle
    }

    fn current_pos(&self) -> i64 {
        self.current_pos
    }

    fn set_current_pos(&mut self, pos: i64) {
        self.current_pos = pos;
        self.target_pos = pos;
        self.publish_standstill();
    }

    fn max_speed(&self) -> f64 {
        self.max_speed
    }

    fn set_max_speed(&mut self, speed: f64) {
        self.max_speed = speed.abs();
    }

    /// Not used: VACTUAL jumps to the requested velocity.
    fn acceleration(&self) -> f64 {
        self.acceleration
    }

    fn set_acceleration(&mut self, acceleration: f64) {
        self.acceleration = acceleration.abs();
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
        self.target_pos = resolve_target(self.current_pos, steps, mode);
        self.handle
            .publish(self.current_pos, self.target_pos, 0.0, MovementPhase::Standstill);
        Ok(())
    }

    fn run_prepared(&mut self, observer: &mut dyn StepObserver) -> Result<StopMode> {
        let distance = self.target_pos - self.current_pos;
        if distance == 0 || self.max_speed == 0.0 {
            self.publish_standstill();
            return Ok(StopMode::NoStop);
        }

        let direction = Direction::from_steps(distance);
        let rps = self.max_speed / self.steps_per_rev as f64 * direction.sign() as f64;
        let duration_ms = round(distance.unsigned_abs() as f64 / self.max_speed * 1_000.0) as u64;
        let target = self.target_pos;

        let outcome = self.run_vactual(
            rps_to_vactual(rps, self.steps_per_rev),
            duration_ms.max(1),
            observer,
        )?;
        if outcome == StopMode::NoStop {
            self.set_current_pos(target);
        }
        Ok(outcome)
    }
}
