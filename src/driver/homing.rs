//! Sensorless homing and StallGuard tuning.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use libm::round;
use tracing::{debug, info, warn};

use crate::com::RegisterBus;
use crate::error::{ConfigError, Result};
use crate::gpio::DiagInterrupt;
use crate::math::{rps_to_steps, steps_to_rps};
use crate::motion::{MotionControl, MovementAbsRel, MovementPhase, StopMode, VActual};
use crate::reg::lock;
use crate::stallguard::{read_stallguard_result, StallCallback, StallGuardPoller};

use super::Tmc;

/// Acceleration used by polling homing, in µsteps/s².
pub const HOMING_ACCELERATION: f64 = 10_000.0;

/// Lowest StallGuard result seen in each ramp phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallGuardMinima {
    /// While accelerating.
    pub accelerating: Option<u16>,
    /// At max speed.
    pub max_speed: Option<u16>,
    /// While decelerating.
    pub decelerating: Option<u16>,
}

impl StallGuardMinima {
    fn record(&mut self, phase: MovementPhase, value: u16) {
        let slot = match phase {
            MovementPhase::Accelerating => &mut self.accelerating,
            MovementPhase::MaxSpeed => &mut self.max_speed,
            MovementPhase::Decelerating => &mut self.decelerating,
            MovementPhase::Standstill => return,
        };
        *slot = Some(slot.map_or(value, |min| min.min(value)));
    }
}

impl<B, STEP, DIR, EN, D> Tmc<B, STEP, DIR, EN, D>
where
    B: RegisterBus,
    STEP: OutputPin + Send + 'static,
    DIR: OutputPin + Send + 'static,
    EN: OutputPin,
    D: DelayNs + Clone + Send + 'static,
{
    /// Home against a mechanical stop using VACTUAL and the DIAG pin.
    ///
    /// Switches to StealthChop, arms StallGuard on `diag` with a minimum
    /// speed of half the homing speed, then turns for at most `revolutions`
    /// (negative for the other direction) at `speed_rpm`, or at the homing
    /// speed when `None`. The DIAG pin is released afterwards.
    ///
    /// Returns `true` and zeroes the position when a stall stopped the
    /// motor, `false` when the revolutions ran out first.
    ///
    /// # Errors
    ///
    /// `NoRegisterBus` without a bus and `Unsupported` on chips without
    /// VACTUAL, both before anything is written.
    pub fn do_homing<I>(
        &mut self,
        diag: I,
        revolutions: f64,
        threshold: u16,
        speed_rpm: Option<f64>,
    ) -> Result<bool>
    where
        I: DiagInterrupt + Send + 'static,
    {
        let regs = self.regs()?.clone();
        if !lock(&regs)?.contains("VACTUAL") {
            return Err(ConfigError::Unsupported("VACTUAL homing").into());
        }
        self.ensure_idle()?;
        self.ensure_not_faulted()?;

        let steps_per_rev = self.steps_per_rev();
        let speed_rpm = speed_rpm
            .unwrap_or_else(|| steps_to_rps(self.max_speed_homing(), steps_per_rev) * 60.0);
        if revolutions == 0.0 || speed_rpm == 0.0 {
            warn!(revolutions, speed_rpm, "homing needs a distance and a speed");
            return Ok(false);
        }

        info!(revolutions, threshold, speed_rpm, "homing");
        // StallGuard only works with StealthChop
        self.set_spreadcycle(false)?;

        let mut homing = VActual::new(regs, self.delay_provider(), steps_per_rev, 0.0);
        homing.set_poll_interval_ms(self.vactual_poll_interval_ms());
        let stopper = homing.handle().clone();
        let callback: StallCallback = Arc::new(move || stopper.stop(StopMode::HardStop));
        let min_speed = 0.5 * rps_to_steps(speed_rpm / 60.0, steps_per_rev);
        self.set_stallguard_callback(diag, threshold, Some(callback), min_speed)?;

        let outcome = homing.set_vactual_rpm(speed_rpm, revolutions);
        // a stall in the last poll tick ends the move without a stop request
        let stalled = self.stallguard().map_or(false, |sg| sg.is_triggered());
        let disarmed = self.remove_stallguard_callback();
        let outcome = outcome?;
        disarmed?;

        let homed = stalled || outcome == StopMode::HardStop;
        if homed {
            info!("homing successful");
            if self.has_motion() {
                self.set_current_pos(0)?;
            }
        } else {
            info!("homing failed");
        }
        Ok(homed)
    }

    /// Home against a mechanical stop using STEP/DIR, reading the
    /// StallGuard result after every step.
    ///
    /// Runs at the homing speed with [`HOMING_ACCELERATION`] for at most
    /// `revolutions`, then restores the previous speed and acceleration.
    /// Same result contract as [`do_homing`](Self::do_homing).
    pub fn do_homing_polling(&mut self, revolutions: f64, threshold: u16) -> Result<bool> {
        let regs = self.regs()?.clone();
        self.ensure_idle()?;
        self.worker()?.engine()?;
        self.stallguard_mut()?;
        self.ensure_not_faulted()?;

        info!(revolutions, threshold, "homing (polling)");
        self.set_spreadcycle(false)?;

        let max_speed_homing = self.max_speed_homing();
        let steps = round(revolutions * self.steps_per_rev() as f64) as i64;
        let window = {
            let sg = self.stallguard_mut()?;
            sg.set_coolstep_threshold(&mut *lock(&regs)?, max_speed_homing * 0.5)?;
            sg.window(threshold)
        };

        let engine = self.worker_mut()?.engine_mut()?;
        let previous = (engine.max_speed(), engine.acceleration());
        engine.set_acceleration(HOMING_ACCELERATION);
        engine.set_max_speed(max_speed_homing);

        let mut poller = StallGuardPoller::new(regs, window);
        let result =
            engine.run_to_position_steps_with(steps, Some(MovementAbsRel::Relative), &mut poller);
        engine.set_max_speed(previous.0);
        engine.set_acceleration(previous.1);
        result?;

        let homed = poller.stalled();
        debug!(
            pos = engine.current_pos(),
            samples = poller.window().samples(),
            "homing ended"
        );
        if homed {
            info!("homing successful");
            engine.set_current_pos(0);
        } else {
            info!("homing failed");
        }
        Ok(homed)
    }

    /// Run a relative move of `steps` in the background and record the
    /// lowest StallGuard result per ramp phase.
    ///
    /// Use it with the real load to pick a homing threshold.
    pub fn test_stallguard_threshold(&mut self, steps: i64) -> Result<StallGuardMinima> {
        let regs = self.regs()?.clone();
        self.ensure_idle()?;
        self.worker()?.engine()?;
        self.ensure_not_faulted()?;
        info!(steps, "StallGuard threshold test");
        self.set_spreadcycle(false)?;

        let worker = self.worker_mut()?;
        worker.start(steps, Some(MovementAbsRel::Relative))?;
        let handle = worker.handle().clone();

        let mut minima = StallGuardMinima::default();
        let mut sampled = Ok(());
        while !worker.is_finished() {
            let sample = lock(&regs).and_then(|mut regs| {
                let sg_result = read_stallguard_result(&mut *regs)?;
                let cs_actual = regs.read_field("DRV_STATUS", "cs_actual")?;
                Ok((sg_result, cs_actual))
            });
            match sample {
                Ok((sg_result, cs_actual)) => {
                    let phase = handle.phase();
                    debug!(?phase, sg_result, cs_actual, "stallguard sample");
                    minima.record(phase, sg_result);
                }
                Err(e) => {
                    worker.stop(StopMode::HardStop);
                    sampled = Err(e);
                    break;
                }
            }
        }

        let finished = worker.wait_for_movement_finished();
        sampled?;
        finished?;

        info!(
            accelerating = ?minima.accelerating,
            max_speed = ?minima.max_speed,
            decelerating = ?minima.decelerating,
            "min StallGuard results"
        );
        Ok(minima)
    }
}
