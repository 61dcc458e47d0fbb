//! Cancellable delayed actions.
//!
//! Reconnect timers and poll cadences are expressed as [`ScheduledTask`]s
//! instead of ad hoc `sleep` calls, so cancellation is a single method call
//! and tests can drive them with tokio's paused clock.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A delayed action running on the tokio runtime.
///
/// The action runs once `delay` has elapsed unless [`cancel`](Self::cancel)
/// is called first. Dropping the handle cancels a pending action; an action
/// that has already started is allowed to finish.
#[derive(Debug)]
pub struct ScheduledTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    delay: Duration,
    fires_at: Instant,
}

impl ScheduledTask {
    /// Schedule `action` to run after `delay`.
    pub fn after<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let fires_at = Instant::now() + delay;

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::trace!("scheduled task cancelled before firing");
                }
                () = tokio::time::sleep_until(fires_at) => action.await,
            }
        });

        Self {
            cancel,
            handle,
            delay,
            fires_at,
        }
    }

    /// Cancel the action if it has not started yet.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The delay this task was scheduled with.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// When the action is (or was) due to run.
    pub fn fires_at(&self) -> Instant {
        self.fires_at
    }

    /// Whether the underlying task has completed (fired or cancelled).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let task = ScheduledTask::after(Duration::from_millis(500), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.delay(), Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        let task = ScheduledTask::after(Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_action() {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        drop(ScheduledTask::after(Duration::from_secs(1), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
