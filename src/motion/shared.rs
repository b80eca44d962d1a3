//! Motion status shared between the engine and its observers.
//!
//! The engine loop is the only writer of position, speed and phase. Any
//! number of readers poll them, and anyone may post a stop request that the
//! loop picks up at its next step boundary.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::profile::{MovementPhase, StopMode};

#[derive(Debug, Default)]
struct MotionShared {
    current_pos: AtomicI64,
    target_pos: AtomicI64,
    speed_bits: AtomicU64,
    phase: AtomicU8,
    stop: AtomicU8,
}

/// Point-in-time view of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSnapshot {
    /// Position in µsteps.
    pub current_pos: i64,
    /// Target in µsteps.
    pub target_pos: i64,
    /// Signed speed in µsteps/s.
    pub speed: f64,
    /// Ramp phase.
    pub phase: MovementPhase,
}

/// Cheap, cloneable handle on a motion engine's status and stop flag.
#[derive(Debug, Clone, Default)]
pub struct MotionHandle {
    inner: Arc<MotionShared>,
}

impl MotionHandle {
    /// Create a handle for a standing engine at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. `NoStop` withdraws a pending request.
    pub fn stop(&self, mode: StopMode) {
        debug!(?mode, "stop requested");
        self.inner.stop.store(mode.to_u8(), Ordering::Release);
    }

    /// Pending stop request, without clearing it.
    pub fn pending_stop(&self) -> StopMode {
        StopMode::from_u8(self.inner.stop.load(Ordering::Acquire))
    }

    /// Take and clear the pending stop request.
    pub(crate) fn take_stop(&self) -> StopMode {
        StopMode::from_u8(self.inner.stop.swap(StopMode::NoStop.to_u8(), Ordering::AcqRel))
    }

    /// Publish the engine state.
    pub(crate) fn publish(&self, current_pos: i64, target_pos: i64, speed: f64, phase: MovementPhase) {
        self.inner.current_pos.store(current_pos, Ordering::Relaxed);
        self.inner.target_pos.store(target_pos, Ordering::Relaxed);
        self.inner.speed_bits.store(speed.to_bits(), Ordering::Relaxed);
        self.inner.phase.store(phase.to_u8(), Ordering::Release);
    }

    /// Current position in µsteps.
    pub fn current_pos(&self) -> i64 {
        self.inner.current_pos.load(Ordering::Relaxed)
    }

    /// Signed speed in µsteps/s.
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.inner.speed_bits.load(Ordering::Relaxed))
    }

    /// Current ramp phase.
    pub fn phase(&self) -> MovementPhase {
        MovementPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
    }

    /// All published values at once.
    pub fn snapshot(&self) -> MotionSnapshot {
        let phase = self.phase();
        MotionSnapshot {
            current_pos: self.current_pos(),
            target_pos: self.inner.target_pos.load(Ordering::Relaxed),
            speed: self.speed(),
            phase,
        }
    }
}
