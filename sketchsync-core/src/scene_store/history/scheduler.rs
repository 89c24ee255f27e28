/*
    scheduler.rs - Debounce commit timer

    Holds at most one pending commit task. Re-arming aborts the previous
    task, and the generation check in ChangeLog::commit_if_current covers a
    task that already woke up before the abort landed.

    Outside a tokio runtime nothing is spawned; the caller drives commits
    through ChangeLog::commit_expired instead.
*/

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

#[derive(Debug, Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` at `deadline`, replacing any pending task.
    ///
    /// Returns false when no runtime is available.
    pub fn schedule<F>(&mut self, deadline: Instant, on_fire: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let Ok(runtime) = Handle::try_current() else {
            trace!("no tokio runtime, debounce commit left to the caller");
            return false;
        };

        self.handle = Some(runtime.spawn(async move {
            sleep_until(deadline).await;
            on_fire();
        }));
        true
    }

    /// Abort the pending task, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a task is scheduled and has not finished
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
