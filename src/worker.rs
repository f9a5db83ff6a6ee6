//! Worker pool
//!
//! Background execution for async/delayed dispatch and quest timers. Every
//! submission is non-blocking for the caller; tasks run on the tokio runtime
//! the pool was created from.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send + 'static>;
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

/// Handle to a delayed or repeating task
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    handle: AbortHandle,
}

impl ScheduledTask {
    pub fn new(handle: AbortHandle) -> Self {
        Self { handle }
    }

    /// Stop the task. A delayed task that already ran is unaffected.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

pub trait WorkerPool: Send + Sync {
    /// Run `task` as soon as a worker is free
    fn submit(&self, task: Task);

    /// Run `task` once after `delay`
    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask;

    /// Run `task` after `initial`, then every `period` until cancelled
    fn schedule_repeating(
        &self,
        task: RepeatingTask,
        initial: Duration,
        period: Duration,
    ) -> ScheduledTask;
}

/// Worker pool backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioWorkerPool {
    handle: Handle,
}

impl TokioWorkerPool {
    /// Pool on the runtime the caller is running in, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl WorkerPool for TokioWorkerPool {
    fn submit(&self, task: Task) {
        self.handle.spawn(async move {
            run_isolated("worker task", task);
        });
    }

    fn schedule(&self, task: Task, delay: Duration) -> ScheduledTask {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            run_isolated("scheduled task", task);
        });
        ScheduledTask::new(join.abort_handle())
    }

    fn schedule_repeating(
        &self,
        task: RepeatingTask,
        initial: Duration,
        period: Duration,
    ) -> ScheduledTask {
        // interval() rejects a zero period
        let period = period.max(Duration::from_millis(1));
        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + initial, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let task = task.clone();
                run_isolated("repeating task", move || task());
            }
        });
        ScheduledTask::new(join.abort_handle())
    }
}

/// Run `f`, logging instead of unwinding if it panics
pub(crate) fn run_isolated(what: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        warn!("{} panicked: {}", what, panic_message(panic.as_ref()));
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool() -> TokioWorkerPool {
        TokioWorkerPool::current().expect("inside a tokio runtime")
    }

    #[tokio::test]
    async fn test_submit_runs_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        pool().submit(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_poison_pool() {
        let pool = pool();
        pool.submit(Box::new(|| panic!("boom")));

        let (tx, rx) = tokio::sync::oneshot::channel();
        pool.submit(Box::new(move || {
            let _ = tx.send(());
        }));
        assert!(rx.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_waits_and_can_be_cancelled() {
        let pool = pool();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = ran.clone();
        pool.schedule(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_secs(5),
        );

        let counter = ran.clone();
        let cancelled = pool.schedule(
            Box::new(move || {
                counter.fetch_add(100, Ordering::SeqCst);
            }),
            Duration::from_secs(5),
        );
        cancelled.cancel();

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_task_rearms_until_cancelled() {
        let pool = pool();
        let ticks = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let handle = pool.schedule_repeating(
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_panic_message() {
        let panic = catch_unwind(|| panic!("plain")).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "plain");

        let panic = catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(panic.as_ref()), "formatted 7");
    }
}
