//! Polling strategy: StallGuard results read after every step.

use heapless::HistoryBuffer;
use tracing::{debug, info};

use crate::com::RegisterBus;
use crate::config::StallGuardConfig;
use crate::error::Result;
use crate::motion::{MotionSnapshot, StepObserver, StopMode};
use crate::reg::{lock, SharedRegisters};

use super::{read_stallguard_result, HISTORY_CAPACITY};

/// Moving average of the most recent StallGuard results.
///
/// A stall is reported once more than `min_samples` values were pushed and
/// the mean of the last `window` values is below the threshold.
#[derive(Debug, Clone)]
pub struct StallWindow {
    history: HistoryBuffer<u16, HISTORY_CAPACITY>,
    threshold: u16,
    window: usize,
    min_samples: u32,
    samples: u32,
}

impl StallWindow {
    /// Create an empty window. `window` is clamped to `1..=64`.
    pub fn new(threshold: u16, window: usize, min_samples: u32) -> Self {
        Self {
            history: HistoryBuffer::new(),
            threshold,
            window: window.clamp(1, HISTORY_CAPACITY),
            min_samples,
            samples: 0,
        }
    }

    /// Window with the configured size and the given threshold.
    pub fn from_config(config: &StallGuardConfig, threshold: u16) -> Self {
        Self::new(threshold, config.window, config.min_samples)
    }

    /// Stall threshold.
    #[inline]
    pub fn threshold(&self) -> u16 {
        self.threshold
    }

    /// Number of values pushed since the last reset.
    #[inline]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Mean of the last `window` values, once that many were pushed.
    pub fn mean(&self) -> Option<f64> {
        let len = self.history.len();
        if len < self.window {
            return None;
        }
        let sum: u32 = self
            .history
            .oldest_ordered()
            .skip(len - self.window)
            .map(|v| *v as u32)
            .sum();
        Some(sum as f64 / self.window as f64)
    }

    /// Record a result. Returns `true` when it completes a stall.
    pub fn push(&mut self, value: u16) -> bool {
        self.history.write(value);
        self.samples = self.samples.saturating_add(1);

        if self.samples <= self.min_samples {
            return false;
        }
        matches!(self.mean(), Some(mean) if mean < self.threshold as f64)
    }

    /// Forget all values.
    pub fn reset(&mut self) {
        self.history.clear();
        self.samples = 0;
    }
}

/// Step observer reading the StallGuard result after every step and
/// requesting a hard stop on stall.
pub struct StallGuardPoller<B> {
    regs: SharedRegisters<B>,
    window: StallWindow,
    stalled: bool,
}

impl<B: RegisterBus> StallGuardPoller<B> {
    /// Create a poller on shared registers.
    pub fn new(regs: SharedRegisters<B>, window: StallWindow) -> Self {
        Self {
            regs,
            window,
            stalled: false,
        }
    }

    /// Whether a stall stopped the movement.
    #[inline]
    pub fn stalled(&self) -> bool {
        self.stalled
    }

    /// The sample window.
    pub fn window(&self) -> &StallWindow {
        &self.window
    }
}

impl<B: RegisterBus> StepObserver for StallGuardPoller<B> {
    fn on_step(&mut self, status: &MotionSnapshot) -> Result<Option<StopMode>> {
        if self.stalled {
            return Ok(None);
        }

        let sg_result = read_stallguard_result(&mut *lock(&self.regs)?)?;
        if self.window.push(sg_result) {
            self.stalled = true;
            info!(
                pos = status.current_pos,
                mean = ?self.window.mean(),
                "stall detected"
            );
            return Ok(Some(StopMode::HardStop));
        }
        debug!(pos = status.current_pos, sg_result, "stallguard");
        Ok(None)
    }
}
