//! DIAG interrupt strategy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gpio::DiagHandler;

/// Function run when the DIAG pin reports a stall.
///
/// Called from the interrupt context of the board support code. Keep it
/// short, typically `MotionHandle::stop(StopMode::HardStop)`.
pub type StallCallback = Arc<dyn Fn() + Send + Sync>;

/// Latched "stall seen" flag, shared with the DIAG handler.
#[derive(Debug, Clone, Default)]
pub struct StallFlag {
    triggered: Arc<AtomicBool>,
}

impl StallFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stall was reported since the last clear.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Clear the flag.
    pub fn clear(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    fn set(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    /// DIAG edge handler: latch the flag, then run the callback.
    pub(crate) fn handler(&self, callback: Option<StallCallback>) -> DiagHandler {
        let flag = self.clone();
        Box::new(move || {
            flag.set();
            if let Some(callback) = &callback {
                callback();
            }
        })
    }
}
