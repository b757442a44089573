use crate::shared::error::AppError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

/// Supervisor for fire-and-forget work spawned by the engine.
#[derive(Clone, Default)]
pub(crate) struct BackgroundTasks {
    tracker: TaskTracker,
    // One close/wait/reopen cycle at a time.
    idle: Arc<Mutex<()>>,
}

impl BackgroundTasks {
    pub(crate) fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            idle: Arc::new(Mutex::new(())),
        }
    }

    /// Runs `task` detached from the caller. Errors and panics are logged under
    /// `name` and never reach the caller.
    pub(crate) fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.tracker.spawn(async move {
            match handle.await {
                Ok(Ok(())) => {
                    tracing::trace!(target: "sync::tasks", task = name, "background task finished");
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        target: "sync::tasks",
                        task = name,
                        error = %err,
                        "background task failed"
                    );
                }
                Err(err) if err.is_panic() => {
                    tracing::error!(target: "sync::tasks", task = name, "background task panicked");
                }
                Err(_) => {
                    tracing::debug!(target: "sync::tasks", task = name, "background task cancelled");
                }
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tracker.len()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Waits until every task spawned so far, and anything they spawn, is done.
    pub(crate) async fn wait_idle(&self) {
        let _cycle = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
