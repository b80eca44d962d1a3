//! Motion module for tmc-driver.
//!
//! Provides the ramp law, the STEP/DIR and VACTUAL engines and the
//! background worker that runs either of them on its own thread.

mod profile;
mod shared;
mod step_dir;
mod threaded;
mod vactual;

pub use profile::{Direction, MovementAbsRel, MovementPhase, Ramp, StopMode};
pub use shared::{MotionHandle, MotionSnapshot};
pub use step_dir::{StepDir, DEFAULT_STEP_PULSE_NS};
pub use threaded::MotionWorker;
pub use vactual::{VActual, DEFAULT_POLL_INTERVAL_MS};

use crate::error::Result;

/// Hook called by an engine after every emitted step (or poll tick).
///
/// Returning `Some(mode)` requests a stop, honored at the next step
/// boundary. Returning an error aborts the movement with a hard stop.
pub trait StepObserver {
    /// Observe the state right after a step.
    fn on_step(&mut self, status: &MotionSnapshot) -> Result<Option<StopMode>>;
}

/// Observer that never interferes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObserver;

impl StepObserver for NoObserver {
    #[inline]
    fn on_step(&mut self, _status: &MotionSnapshot) -> Result<Option<StopMode>> {
        Ok(None)
    }
}

impl<F> StepObserver for F
where
    F: FnMut(&MotionSnapshot) -> Result<Option<StopMode>>,
{
    fn on_step(&mut self, status: &MotionSnapshot) -> Result<Option<StopMode>> {
        self(status)
    }
}

/// Common interface of the motion engines.
///
/// Positions and speeds are in µsteps.
pub trait MotionControl {
    /// Status and stop handle of this engine.
    fn handle(&self) -> &MotionHandle;

    /// Current position.
    fn current_pos(&self) -> i64;

    /// Redefine the current position.
    fn set_current_pos(&mut self, pos: i64);

    /// Max speed in µsteps/s.
    fn max_speed(&self) -> f64;

    /// Set max speed in µsteps/s.
    fn set_max_speed(&mut self, speed: f64);

    /// Acceleration in µsteps/s².
    fn acceleration(&self) -> f64;

    /// Set acceleration in µsteps/s².
    fn set_acceleration(&mut self, acceleration: f64);

    /// Default interpretation of positions when a call passes `None`.
    fn movement_abs_rel(&self) -> MovementAbsRel;

    /// Set the default interpretation of positions.
    fn set_movement_abs_rel(&mut self, mode: MovementAbsRel);

    /// Set the target for the next run and publish the initial state.
    ///
    /// Clears any stop request left over from a previous movement, so it
    /// must run before the movement is handed to another thread.
    fn prepare_move(&mut self, steps: i64, abs_rel: Option<MovementAbsRel>) -> Result<()>;

    /// Run a prepared movement to its end.
    fn run_prepared(&mut self, observer: &mut dyn StepObserver) -> Result<StopMode>;

    /// Move and block until the movement ends.
    ///
    /// Returns `NoStop` when the target was reached, otherwise the stop
    /// mode that ended the movement.
    fn run_to_position_steps(
        &mut self,
        steps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<StopMode> {
        self.run_to_position_steps_with(steps, abs_rel, &mut NoObserver)
    }

    /// Like [`run_to_position_steps`](Self::run_to_position_steps), calling
    /// `observer` after every step.
    fn run_to_position_steps_with(
        &mut self,
        steps: i64,
        abs_rel: Option<MovementAbsRel>,
        observer: &mut dyn StepObserver,
    ) -> Result<StopMode> {
        self.prepare_move(steps, abs_rel)?;
        self.run_prepared(observer)
    }

    /// Request a stop of the running movement.
    fn stop(&self, mode: StopMode) {
        self.handle().stop(mode);
    }

    /// Current ramp phase.
    fn movement_phase(&self) -> MovementPhase {
        self.handle().phase()
    }
}

/// Target position for a move request.
pub(crate) fn resolve_target(current: i64, steps: i64, mode: MovementAbsRel) -> i64 {
    match mode {
        MovementAbsRel::Absolute => steps,
        MovementAbsRel::Relative => current.saturating_add(steps),
    }
}
