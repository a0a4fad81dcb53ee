//! Cooperative cancellation checkpoints.

use crate::scheduler::ScheduleError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle a running task uses to notice its own supersession.
///
/// Long-running work must call [`Checkpoint::check`] at points where
/// abandoning is safe - between pipeline stages, before cache writes. The
/// check is a relaxed atomic load, cheap enough for loops.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    canceled: Arc<AtomicBool>,
}

impl Checkpoint {
    pub(crate) fn new(canceled: Arc<AtomicBool>) -> Self {
        Self { canceled }
    }

    /// Construct a checkpoint that never cancels (for direct invocations
    /// outside the scheduler, e.g. in tests).
    pub fn detached() -> Self {
        Self { canceled: Arc::new(AtomicBool::new(false)) }
    }

    /// Fail with [`ScheduleError::Superseded`] if cancellation was
    /// requested.
    #[inline]
    pub fn check(&self) -> Result<(), ScheduleError> {
        if self.canceled.load(Ordering::Relaxed) {
            Err(ScheduleError::Superseded)
        } else {
            Ok(())
        }
    }

    /// Non-failing form of [`Checkpoint::check`].
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }
}
