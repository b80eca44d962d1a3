//! Background execution of a motion engine.
//!
//! The engine is moved onto a worker thread for the duration of one
//! movement and handed back on [`MotionWorker::wait_for_movement_finished`].
//! Status polls and stop requests go through the shared [`MotionHandle`].

use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::error::{MotionError, Result};

use super::profile::{MovementAbsRel, StopMode};
use super::shared::MotionHandle;
use super::{MotionControl, NoObserver};

type Finished<M> = (M, Result<StopMode>);

/// Owner of a motion engine that can run movements on a background thread.
pub struct MotionWorker<M> {
    engine: Option<M>,
    handle: MotionHandle,
    thread: Option<JoinHandle<Finished<M>>>,
}

impl<M> MotionWorker<M>
where
    M: MotionControl + Send + 'static,
{
    /// Wrap an idle engine.
    pub fn new(engine: M) -> Self {
        let handle = engine.handle().clone();
        Self {
            engine: Some(engine),
            handle,
            thread: None,
        }
    }

    /// Status and stop handle. Usable while a movement runs.
    #[inline]
    pub fn handle(&self) -> &MotionHandle {
        &self.handle
    }

    /// Whether a background movement is in flight.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Whether the background movement has ended and can be joined without
    /// blocking. `true` when nothing was started.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// The idle engine.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` while a background movement is in flight,
    /// `WorkerPanicked` if a previous movement lost the engine.
    pub fn engine(&self) -> Result<&M> {
        if self.thread.is_some() {
            return Err(MotionError::AlreadyRunning.into());
        }
        self.engine
            .as_ref()
            .ok_or_else(|| MotionError::WorkerPanicked.into())
    }

    /// The idle engine, mutably. Same errors as [`engine`](Self::engine).
    pub fn engine_mut(&mut self) -> Result<&mut M> {
        if self.thread.is_some() {
            return Err(MotionError::AlreadyRunning.into());
        }
        self.engine
            .as_mut()
            .ok_or_else(|| MotionError::WorkerPanicked.into())
    }

    /// Move on the calling thread.
    pub fn run_to_position_steps(
        &mut self,
        steps: i64,
        abs_rel: Option<MovementAbsRel>,
    ) -> Result<StopMode> {
        self.engine_mut()?.run_to_position_steps(steps, abs_rel)
    }

    /// Start a movement on a background thread and return immediately.
    pub fn start(&mut self, steps: i64, abs_rel: Option<MovementAbsRel>) -> Result<()> {
        self.engine_mut()?.prepare_move(steps, abs_rel)?;
        let mut engine = self
            .engine
            .take()
            .ok_or(MotionError::WorkerPanicked)?;

        let spawned = thread::Builder::new()
            .name("tmc-motion".into())
            .spawn(move || {
                let result = engine.run_prepared(&mut NoObserver);
                (engine, result)
            });

        match spawned {
            Ok(thread) => {
                debug!(steps, "movement started in background");
                self.thread = Some(thread);
                Ok(())
            }
            Err(e) => {
                // the closure, and the engine with it, is gone
                error!("could not spawn motion thread: {}", e);
                Err(MotionError::WorkerPanicked.into())
            }
        }
    }

    /// Request a stop of the running movement.
    pub fn stop(&self, mode: StopMode) {
        self.handle.stop(mode);
    }

    /// Block until the background movement ends and take the engine back.
    ///
    /// # Errors
    ///
    /// `NotRunning` if no movement was started, `WorkerPanicked` if the
    /// thread panicked, or the error the movement itself ended with.
    pub fn wait_for_movement_finished(&mut self) -> Result<StopMode> {
        let thread = self.thread.take().ok_or(MotionError::NotRunning)?;
        match thread.join() {
            Ok((engine, result)) => {
                self.engine = Some(engine);
                result
            }
            Err(_) => {
                error!("motion thread panicked");
                Err(MotionError::WorkerPanicked.into())
            }
        }
    }

    /// Stop any running movement and return the engine.
    pub fn into_engine(mut self) -> Result<M> {
        if self.thread.is_some() {
            self.handle.stop(StopMode::HardStop);
            self.wait_for_movement_finished()?;
        }
        self.engine.take().ok_or_else(|| MotionError::WorkerPanicked.into())
    }
}
