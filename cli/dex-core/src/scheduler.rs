//! Debouncing, split into a pure decision and a timer.
//!
//! [Debounce] only answers "should this fire now" for explicit instants.
//! [DebouncedTask] runs a future once events stop arriving for a while.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Fires once, `wait` after the last recorded event.
#[derive(Debug, Clone)]
pub struct Debounce {
    wait: Duration,
    last_event: Option<Instant>,
}

impl Debounce {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            last_event: None,
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Record an event, pushing the deadline back.
    pub fn record(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|last| last + self.wait)
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Like [Debounce::due], but consumes the pending event when it is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        let due = self.due(now);
        if due {
            self.last_event = None;
        }
        due
    }

    pub fn cancel(&mut self) {
        self.last_event = None;
    }
}

/// Runs the most recently scheduled future `wait` after it was scheduled,
/// aborting any earlier one that hasn't started yet or is still running.
#[derive(Debug)]
pub struct DebouncedTask {
    wait: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebouncedTask {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            pending: Mutex::new(None),
        }
    }

    /// Must be called within a tokio runtime.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let wait = self.wait;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            task.await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for DebouncedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(300));
        assert!(!debounce.due(start));

        debounce.record(start);
        debounce.record(start + Duration::from_millis(200));
        assert!(!debounce.take_due(start + Duration::from_millis(400)));
        assert!(debounce.take_due(start + Duration::from_millis(500)));
        assert!(!debounce.take_due(start + Duration::from_millis(900)));
    }

    #[test]
    fn cancel_drops_pending_event() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(150));
        debounce.record(start);
        debounce.cancel();
        assert!(!debounce.due(start + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_scheduled_task_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let task = DebouncedTask::new(Duration::from_millis(300));

        for n in 1..=3 {
            let runs = Arc::clone(&runs);
            let last = Arc::clone(&last);
            task.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(n, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(task.is_pending());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let task = DebouncedTask::new(Duration::from_millis(150));
        let counter = Arc::clone(&runs);
        task.schedule(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!task.is_pending());
    }
}
