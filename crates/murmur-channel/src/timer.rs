//! One-shot delayed tasks owned by a channel.
//!
//! Every schedule gets a new generation. A task that fires passes its
//! generation back to [`DeferredTask::disarm`]; if it was superseded in the
//! meantime the disarm is refused and the task must not act.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// A cancellable task that runs once after a delay.
///
/// Scheduling again replaces (and aborts) the pending run. Dropping the
/// handle aborts it as well, so a channel never leaks timers.
#[derive(Debug, Default)]
pub struct DeferredTask {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl DeferredTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the future built by `task` after `delay`. `task` receives the
    /// generation of this schedule.
    pub fn schedule<T, F>(&mut self, delay: Duration, task: T)
    where
        T: FnOnce(u64) -> F,
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let fut = task(self.generation);
        match Handle::try_current() {
            Ok(runtime) => {
                self.handle = Some(runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    fut.await;
                }));
            }
            Err(e) => warn!(error = %e, "No tokio runtime, deferred task not scheduled"),
        }
    }

    /// Generation of the most recent schedule.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Abort the pending run. Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the handle without aborting; called from the task itself once
    /// it has fired. Returns `false`, leaving everything untouched, if the
    /// task was cancelled or replaced since it was scheduled.
    pub fn disarm(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut task = DeferredTask::new();
        let counter = fired.clone();
        task.schedule(Duration::from_secs(5), |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_replaces_pending_run() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut task = DeferredTask::new();
        for _ in 0..3 {
            let counter = fired.clone();
            task.schedule(Duration::from_secs(5), |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_abort() {
        let fired = Arc::new(AtomicU32::new(0));
        let mut task = DeferredTask::new();
        let counter = fired.clone();
        task.schedule(Duration::from_secs(1), |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.cancel());
        assert!(!task.cancel());

        let counter = fired.clone();
        task.schedule(Duration::from_secs(1), |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(task);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_schedule_without_runtime_is_skipped() {
        let mut task = DeferredTask::new();
        task.schedule(Duration::from_secs(1), |_| async {});
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_generation_cannot_disarm() {
        let mut task = DeferredTask::new();
        task.schedule(Duration::from_secs(60), |_| async {});
        let stale = task.generation();
        task.cancel();
        assert!(!task.disarm(stale));

        task.schedule(Duration::from_secs(60), |_| async {});
        let current = task.generation();
        assert_ne!(stale, current);
        assert!(!task.disarm(stale));
        assert!(task.is_pending());

        assert!(task.disarm(current));
        assert!(!task.is_pending());
        assert!(!task.disarm(current));
    }
}
