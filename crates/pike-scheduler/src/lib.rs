//! Cooperative request scheduling for the analyzer pipeline.
//!
//! Exactly one task runs at a time: the mediator is single-threaded and the
//! analyzer has no internal parallelism to exploit. The scheduler's job is
//! to decide *which* caller-submitted task runs next, and to cancel or
//! coalesce tasks made redundant by newer ones.
//!
//! # Request classes
//!
//! Three ordered queues: `typing` > `interactive` > `background`. Selection
//! drains the highest-priority non-empty queue head. When only a background
//! task is eligible, the scheduler yields for a short grace period first so
//! a typing burst is not pre-empted by a just-scheduled background item.
//!
//! # Supersession
//!
//! Tasks may carry a `key`. A new submission under an existing key cancels
//! the pending holder outright ([`ScheduleError::Superseded`]) or, if the
//! holder already started, trips its [`Checkpoint`] so it aborts at the
//! next safe yield point. Supersession is not a fault: callers treat it as
//! "a fresher version of this work is in flight".

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod metrics;
mod scheduler;

pub use checkpoint::Checkpoint;
pub use metrics::{ClassWaitStats, SchedulerMetrics};
pub use scheduler::{RequestClass, RequestScheduler, ScheduleError, ScheduleOptions};
