//! Scheduler observability counters.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Queue-wait latency aggregate for one request class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassWaitStats {
    /// Samples recorded
    pub count: u64,
    /// Sum of waits in microseconds
    pub total_micros: u64,
    /// Longest single wait in microseconds
    pub max_micros: u64,
}

impl ClassWaitStats {
    fn record(&mut self, wait: Duration) {
        let micros = wait.as_micros() as u64;
        self.count += 1;
        self.total_micros += micros;
        self.max_micros = self.max_micros.max(micros);
    }

    /// Mean wait in microseconds, zero when no samples exist.
    pub fn mean_micros(&self) -> u64 {
        if self.count == 0 { 0 } else { self.total_micros / self.count }
    }
}

/// Lifetime counters plus per-class queue-wait aggregates.
///
/// Observable only - nothing in the scheduler branches on these.
#[derive(Debug, Default)]
pub struct Metrics {
    pub(crate) scheduled: AtomicU64,
    pub(crate) started: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) canceled: AtomicU64,
    pub(crate) waits: Mutex<[ClassWaitStats; 3]>,
}

impl Metrics {
    pub(crate) fn record_wait(&self, class_index: usize, wait: Duration) {
        self.waits.lock()[class_index].record(wait);
    }

    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        let waits = *self.waits.lock();
        SchedulerMetrics {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            waits,
        }
    }
}

/// Point-in-time snapshot of [`Metrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerMetrics {
    /// Tasks ever submitted
    pub scheduled: u64,
    /// Tasks that began running
    pub started: u64,
    /// Tasks that finished successfully
    pub completed: u64,
    /// Tasks that returned an application error
    pub failed: u64,
    /// Tasks canceled by supersession
    pub canceled: u64,
    /// Queue-wait aggregates indexed typing, interactive, background
    pub waits: [ClassWaitStats; 3],
}
