//! The scheduler proper: queues, worker loop, supersession, coalescing.

use crate::checkpoint::Checkpoint;
use crate::metrics::{Metrics, SchedulerMetrics};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Notify, oneshot};

/// How long the worker yields before starting a background task while the
/// higher queues are empty, so a typing burst landing in that window wins.
pub const BACKGROUND_GRACE: Duration = Duration::from_millis(8);

/// Priority class of a scheduled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Latency-critical work triggered by keystrokes
    Typing,
    /// User-visible but not keystroke-bound work
    Interactive,
    /// Work nobody is waiting on
    Background,
}

impl RequestClass {
    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            RequestClass::Typing => 0,
            RequestClass::Interactive => 1,
            RequestClass::Background => 2,
        }
    }
}

/// Submission options for [`RequestScheduler::schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Priority class
    pub class: RequestClass,
    /// Supersession identity; newer submissions with the same key replace
    /// older ones
    pub key: Option<String>,
    /// Pre-queue hold window; only meaningful together with `key`
    pub coalesce: Option<Duration>,
}

impl ScheduleOptions {
    /// Options with just a class.
    pub fn new(class: RequestClass) -> Self {
        Self { class, key: None, coalesce: None }
    }

    /// Attach a supersession key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Hold the task in a coalescing window before it reaches the queue.
    pub fn with_coalesce(mut self, window: Duration) -> Self {
        self.coalesce = Some(window);
        self
    }
}

/// Errors surfaced to `schedule` callers.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A newer submission with the same key is now authoritative. Not a
    /// fault; callers treat it as a no-op.
    #[error("request superseded by a newer submission with the same key")]
    Superseded,
    /// The scheduler was shut down before the task could finish.
    #[error("scheduler is shut down")]
    Shutdown,
    /// The task itself failed.
    #[error(transparent)]
    Task(#[from] anyhow::Error),
}

enum TaskStatus {
    Completed,
    Failed,
    Canceled,
}

type BoxWork =
    Box<dyn FnOnce(Checkpoint) -> Pin<Box<dyn Future<Output = TaskStatus> + Send>> + Send>;

struct TaskEntry {
    id: u64,
    class: RequestClass,
    key: Option<String>,
    canceled: Arc<AtomicBool>,
    /// Resolves the caller with `Superseded` when canceled before start.
    abort: Box<dyn FnOnce() + Send>,
    work: BoxWork,
    enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyPhase {
    Holding,
    Queued,
    Started,
}

struct KeyedTask {
    id: u64,
    phase: KeyPhase,
    canceled: Arc<AtomicBool>,
}

#[derive(Default)]
struct SchedState {
    queues: [VecDeque<TaskEntry>; 3],
    holding: HashMap<u64, TaskEntry>,
    keyed: HashMap<String, KeyedTask>,
    shutdown: bool,
}

struct SchedulerInner {
    state: Mutex<SchedState>,
    wake: Notify,
    metrics: Metrics,
    next_id: AtomicU64,
}

/// Single-worker cooperative scheduler.
///
/// Cloning is cheap; clones share the queues and the worker.
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<SchedulerInner>,
}

impl RequestScheduler {
    /// Create a scheduler and spawn its worker loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedState::default()),
            wake: Notify::new(),
            metrics: Metrics::default(),
            next_id: AtomicU64::new(0),
        });
        tokio::spawn(worker_loop(Arc::clone(&inner)));
        Self { inner }
    }

    /// Submit a task and wait for its result.
    ///
    /// `f` receives a [`Checkpoint`] it should consult at safe yield
    /// points; the checkpoint fails with [`ScheduleError::Superseded`] once
    /// a newer submission with the same key has arrived.
    pub async fn schedule<T, F, Fut>(
        &self,
        options: ScheduleOptions,
        f: F,
    ) -> Result<T, ScheduleError>
    where
        T: Send + 'static,
        F: FnOnce(Checkpoint) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ScheduleError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, ScheduleError>>();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let canceled = Arc::new(AtomicBool::new(false));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let abort_slot = Arc::clone(&slot);
        let abort: Box<dyn FnOnce() + Send> = Box::new(move || {
            if let Some(tx) = abort_slot.lock().take() {
                let _ = tx.send(Err(ScheduleError::Superseded));
            }
        });

        let work: BoxWork = Box::new(move |checkpoint: Checkpoint| {
            Box::pin(async move {
                let result = f(checkpoint).await;
                let status = match &result {
                    Ok(_) => TaskStatus::Completed,
                    Err(ScheduleError::Superseded) => TaskStatus::Canceled,
                    Err(_) => TaskStatus::Failed,
                };
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(result);
                }
                status
            })
        });

        let entry = TaskEntry {
            id,
            class: options.class,
            key: options.key.clone(),
            canceled,
            abort,
            work,
            enqueued_at: Instant::now(),
        };
        self.inner.metrics.scheduled.fetch_add(1, Ordering::Relaxed);
        self.submit(entry, options.coalesce);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ScheduleError::Shutdown),
        }
    }

    /// Cancel a pending (not yet started) task by key.
    ///
    /// Started tasks are left alone; their results are simply discarded by
    /// the caller. Returns whether a pending task was canceled.
    pub fn cancel_pending_by_key(&self, key: &str) -> bool {
        let mut st = self.inner.state.lock();
        let Some(existing) = st.keyed.get(key) else { return false };
        if existing.phase == KeyPhase::Started {
            return false;
        }
        let existing = match st.keyed.remove(key) {
            Some(k) => k,
            None => return false,
        };
        self.cancel_pending_locked(&mut st, existing);
        true
    }

    /// Metrics snapshot.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner.metrics.snapshot()
    }

    /// Stop the worker and fail everything still queued with
    /// [`ScheduleError::Shutdown`].
    pub fn shutdown(&self) {
        let mut st = self.inner.state.lock();
        st.shutdown = true;
        // Dropping the entries drops their result senders; waiting callers
        // observe Shutdown through the closed channel.
        for queue in st.queues.iter_mut() {
            queue.clear();
        }
        st.holding.clear();
        st.keyed.clear();
        drop(st);
        self.inner.wake.notify_one();
    }

    fn submit(&self, entry: TaskEntry, coalesce: Option<Duration>) {
        let mut st = self.inner.state.lock();
        if st.shutdown {
            return; // entry drops; caller sees Shutdown
        }

        if let Some(key) = entry.key.clone() {
            if let Some(existing) = st.keyed.remove(&key) {
                match existing.phase {
                    KeyPhase::Started => {
                        // The running holder aborts at its next checkpoint.
                        tracing::trace!(key, "superseding started task");
                        existing.canceled.store(true, Ordering::Relaxed);
                    }
                    _ => {
                        tracing::trace!(key, "superseding pending task");
                        self.cancel_pending_locked(&mut st, existing);
                    }
                }
            }
            let phase = if coalesce.is_some() { KeyPhase::Holding } else { KeyPhase::Queued };
            st.keyed.insert(
                key,
                KeyedTask { id: entry.id, phase, canceled: Arc::clone(&entry.canceled) },
            );
        }

        match coalesce {
            Some(window) if entry.key.is_some() => {
                let id = entry.id;
                st.holding.insert(id, entry);
                drop(st);
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    promote_held_task(&inner, id);
                });
            }
            _ => {
                let index = entry.class.index();
                st.queues[index].push_back(entry);
                drop(st);
                self.inner.wake.notify_one();
            }
        }
    }

    fn cancel_pending_locked(&self, st: &mut SchedState, existing: KeyedTask) {
        let entry = match existing.phase {
            KeyPhase::Holding => st.holding.remove(&existing.id),
            KeyPhase::Queued => st.queues.iter_mut().find_map(|queue| {
                queue.iter().position(|e| e.id == existing.id).and_then(|pos| queue.remove(pos))
            }),
            KeyPhase::Started => None,
        };
        if let Some(entry) = entry {
            (entry.abort)();
            self.inner.metrics.canceled.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for RequestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Move a coalesced task into its queue once the hold window elapses,
/// unless a newer submission already replaced it.
fn promote_held_task(inner: &Arc<SchedulerInner>, id: u64) {
    let mut st = inner.state.lock();
    let Some(mut entry) = st.holding.remove(&id) else { return };
    if let Some(key) = &entry.key {
        if let Some(keyed) = st.keyed.get_mut(key) {
            if keyed.id == id {
                keyed.phase = KeyPhase::Queued;
            }
        }
    }
    entry.enqueued_at = Instant::now();
    let index = entry.class.index();
    st.queues[index].push_back(entry);
    drop(st);
    inner.wake.notify_one();
}

enum Next {
    Run(TaskEntry),
    Grace,
    Idle,
    Stop,
}

async fn worker_loop(inner: Arc<SchedulerInner>) {
    let mut granted_grace = false;
    loop {
        let next = {
            let mut st = inner.state.lock();
            if st.shutdown {
                Next::Stop
            } else if let Some(entry) = st.queues[0].pop_front().or_else(|| st.queues[1].pop_front())
            {
                mark_started(&mut st, &entry);
                Next::Run(entry)
            } else if !st.queues[2].is_empty() {
                if granted_grace {
                    match st.queues[2].pop_front() {
                        Some(entry) => {
                            mark_started(&mut st, &entry);
                            Next::Run(entry)
                        }
                        None => Next::Idle,
                    }
                } else {
                    Next::Grace
                }
            } else {
                Next::Idle
            }
        };

        match next {
            Next::Run(entry) => {
                granted_grace = false;
                run_task(&inner, entry).await;
            }
            Next::Grace => {
                granted_grace = true;
                tokio::select! {
                    _ = tokio::time::sleep(BACKGROUND_GRACE) => {}
                    _ = inner.wake.notified() => {}
                }
            }
            Next::Idle => {
                granted_grace = false;
                inner.wake.notified().await;
            }
            Next::Stop => break,
        }
    }
}

fn mark_started(st: &mut SchedState, entry: &TaskEntry) {
    if let Some(key) = &entry.key {
        if let Some(keyed) = st.keyed.get_mut(key) {
            if keyed.id == entry.id {
                keyed.phase = KeyPhase::Started;
            }
        }
    }
}

async fn run_task(inner: &Arc<SchedulerInner>, entry: TaskEntry) {
    let id = entry.id;
    let key = entry.key.clone();
    let class_index = entry.class.index();

    inner.metrics.started.fetch_add(1, Ordering::Relaxed);
    inner.metrics.record_wait(class_index, entry.enqueued_at.elapsed());

    let checkpoint = Checkpoint::new(Arc::clone(&entry.canceled));
    let status = (entry.work)(checkpoint).await;

    match status {
        TaskStatus::Completed => inner.metrics.completed.fetch_add(1, Ordering::Relaxed),
        TaskStatus::Failed => inner.metrics.failed.fetch_add(1, Ordering::Relaxed),
        TaskStatus::Canceled => inner.metrics.canceled.fetch_add(1, Ordering::Relaxed),
    };

    if let Some(key) = key {
        let mut st = inner.state.lock();
        if st.keyed.get(&key).is_some_and(|k| k.id == id) {
            st.keyed.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify as TestNotify;

    fn interactive() -> ScheduleOptions {
        ScheduleOptions::new(RequestClass::Interactive)
    }

    async fn settle() {
        // Let the worker drain; paused-time tests auto-advance.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_task_completes() -> Result<(), ScheduleError> {
        let scheduler = RequestScheduler::new();
        let value = scheduler.schedule(interactive(), |_cp| async { Ok(41 + 1) }).await?;
        assert_eq!(value, 42);

        let metrics = scheduler.metrics();
        assert_eq!(metrics.scheduled, 1);
        assert_eq!(metrics.completed, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_error_propagates_as_task_failure() {
        let scheduler = RequestScheduler::new();
        let result: Result<(), _> = scheduler
            .schedule(interactive(), |_cp| async {
                Err(ScheduleError::Task(anyhow::anyhow!("analyzer unreachable")))
            })
            .await;

        assert!(matches!(result, Err(ScheduleError::Task(_))));
        assert_eq!(scheduler.metrics().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_across_classes() {
        let scheduler = RequestScheduler::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(TestNotify::new());

        // Occupy the worker so later submissions queue up.
        let blocker = {
            let gate = Arc::clone(&gate);
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .schedule(interactive(), move |_cp| async move {
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        settle().await;

        let mut handles = Vec::new();
        for (class, label) in [
            (RequestClass::Background, "background"),
            (RequestClass::Typing, "typing"),
            (RequestClass::Interactive, "interactive"),
        ] {
            let order = Arc::clone(&order);
            let scheduler = scheduler.clone();
            handles.push(tokio::spawn(async move {
                scheduler
                    .schedule(ScheduleOptions::new(class), move |_cp| async move {
                        order.lock().push(label);
                        Ok(())
                    })
                    .await
            }));
        }
        settle().await;

        gate.notify_one();
        for handle in handles {
            let _ = handle.await;
        }
        let _ = blocker.await;

        assert_eq!(*order.lock(), vec!["typing", "interactive", "background"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_submission_supersedes_previous() {
        let scheduler = RequestScheduler::new();
        let runs = Arc::new(AtomicU64::new(0));

        let first = {
            let scheduler = scheduler.clone();
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                scheduler
                    .schedule(
                        interactive()
                            .with_key("completion:file:///a.pike")
                            .with_coalesce(Duration::from_millis(100)),
                        move |_cp| async move {
                            runs.fetch_add(1, Ordering::Relaxed);
                            Ok("first")
                        },
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        let second = {
            let scheduler = scheduler.clone();
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                scheduler
                    .schedule(
                        interactive()
                            .with_key("completion:file:///a.pike")
                            .with_coalesce(Duration::from_millis(100)),
                        move |_cp| async move {
                            runs.fetch_add(1, Ordering::Relaxed);
                            Ok("second")
                        },
                    )
                    .await
            })
        };

        let first = first.await.ok();
        assert!(matches!(first, Some(Err(ScheduleError::Superseded))));

        let second = second.await.ok();
        assert!(matches!(second, Some(Ok("second"))));

        // Exactly one body executed; the superseded task never ran.
        assert_eq!(runs.load(Ordering::Relaxed), 1);
        assert_eq!(scheduler.metrics().canceled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_task_trips_checkpoint_on_supersession() {
        let scheduler = RequestScheduler::new();
        let resume = Arc::new(TestNotify::new());

        let first = {
            let scheduler = scheduler.clone();
            let resume = Arc::clone(&resume);
            tokio::spawn(async move {
                scheduler
                    .schedule(interactive().with_key("validate:file:///a.pike"), move |cp| {
                        async move {
                            resume.notified().await;
                            cp.check()?;
                            Ok("first finished")
                        }
                    })
                    .await
            })
        };
        // Let the first task start before superseding it.
        settle().await;

        let second = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .schedule(interactive().with_key("validate:file:///a.pike"), |_cp| async {
                        Ok("second finished")
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        resume.notify_one();
        let first = first.await.ok();
        assert!(matches!(first, Some(Err(ScheduleError::Superseded))));

        let second = second.await.ok();
        assert!(matches!(second, Some(Ok("second finished"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_grace_yields_to_typing() {
        let scheduler = RequestScheduler::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let background = {
            let scheduler = scheduler.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                scheduler
                    .schedule(ScheduleOptions::new(RequestClass::Background), move |_cp| {
                        async move {
                            order.lock().push("background");
                            Ok(())
                        }
                    })
                    .await
            })
        };
        // The worker sees only background work and enters its grace wait.
        tokio::task::yield_now().await;

        let typing = {
            let scheduler = scheduler.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                scheduler
                    .schedule(ScheduleOptions::new(RequestClass::Typing), move |_cp| async move {
                        order.lock().push("typing");
                        Ok(())
                    })
                    .await
            })
        };

        let _ = typing.await;
        let _ = background.await;
        assert_eq!(*order.lock(), vec!["typing", "background"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_runs_after_grace_when_alone() {
        let scheduler = RequestScheduler::new();
        let value = scheduler
            .schedule(ScheduleOptions::new(RequestClass::Background), |_cp| async { Ok(7) })
            .await;
        assert!(matches!(value, Ok(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_by_key() {
        let scheduler = RequestScheduler::new();

        let held = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .schedule(
                        interactive()
                            .with_key("hover:file:///a.pike")
                            .with_coalesce(Duration::from_millis(200)),
                        |_cp| async { Ok(()) },
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(scheduler.cancel_pending_by_key("hover:file:///a.pike"));
        let held = held.await.ok();
        assert!(matches!(held, Some(Err(ScheduleError::Superseded))));

        // Nothing pending anymore.
        assert!(!scheduler.cancel_pending_by_key("hover:file:///a.pike"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_queued_tasks() {
        let scheduler = RequestScheduler::new();
        let gate = Arc::new(TestNotify::new());

        let blocker = {
            let scheduler = scheduler.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                scheduler
                    .schedule(interactive(), move |_cp| async move {
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let queued = {
            let scheduler = scheduler.clone();
            tokio::spawn(
                async move { scheduler.schedule(interactive(), |_cp| async { Ok(()) }).await },
            )
        };
        tokio::task::yield_now().await;

        scheduler.shutdown();
        let queued = queued.await.ok();
        assert!(matches!(queued, Some(Err(ScheduleError::Shutdown))));

        gate.notify_one();
        let _ = blocker.await;
    }
}
