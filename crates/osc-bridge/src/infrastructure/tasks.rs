//! Tracked connection tasks that can be waited for and, failing that,
//! aborted as a group.
//!
//! Shutdown first asks tasks to finish through their own cancellation
//! tokens and waits a bounded time.  Whatever is still running after that
//! is aborted: its future is dropped, which closes the sockets it owns.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A [`TaskTracker`] whose tasks can all be dropped at once.
#[derive(Clone, Default)]
pub struct TaskSet {
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task`; it runs until it completes or [`abort_all`](Self::abort_all) is called.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = abort.cancelled() => {}
                _ = task => {}
            }
        });
    }

    /// No more tasks are expected; [`wait`](Self::wait) can complete once
    /// the running ones finish.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Resolves when the set is closed and every task has finished.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Drops every running task at its next await point.
    pub fn abort_all(&self) {
        self.abort.cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
