//! Supervised background work
//!
//! Reconnect attempts and status publishes run here instead of as detached
//! tasks, so shutdown can cancel them and tests can wait for them.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Owner of the agent's background tasks. Clones share the same set.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled by `shutdown`
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `task` until it finishes or the set is shut down
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(task = name, "not spawning after shutdown");
            return;
        }

        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => debug!(task = name, "background task cancelled"),
                () = task => {}
            }
        });
    }

    /// Number of tasks still running
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait until every task spawned so far has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel all tasks and wait for them to stop
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_idle_waits_for_completion() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        tasks.spawn("sleepy", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tasks.wait_idle().await;

        assert!(done.load(Ordering::SeqCst));
        assert!(tasks.is_empty());

        // still usable afterwards
        tasks.spawn("again", async {});
        tasks.wait_idle().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_work() {
        let tasks = BackgroundTasks::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        tasks.spawn("forever", async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tasks.shutdown().await;

        assert!(!finished.load(Ordering::SeqCst));
        assert!(tasks.token().is_cancelled());

        tasks.spawn("late", async {});
        assert!(tasks.is_empty());
    }
}
