//! Startup sequencing for deferred post-connect work.
//!
//! Work that must run a little while after the transport connects (such as
//! announcing enrollment) is scheduled explicitly and handed back as a
//! [`ScheduledTask`]. Shutdown cancels pending tasks before their timer
//! fires; an implicit dangling timer cannot outlive the process teardown.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A delayed task that can be cancelled before it fires.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel the task. A no-op if it already ran.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the task has finished (ran or was cancelled).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to run. Resolves immediately if it was cancelled.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Run `work` after `delay`, unless cancelled first.
pub fn schedule<F>(delay: Duration, work: F) -> ScheduledTask
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        work.await;
    });
    ScheduledTask { handle }
}
