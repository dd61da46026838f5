use std::future::Future;

use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;

/// Lifecycle of the reporting and heartbeat loops
///
/// Loops are spawned with [`spawn`](Self::spawn) and watch [`cancelled`](Self::cancelled).
/// [`shutdown`](Self::shutdown) signals every loop and waits until all of them have
/// returned, so the reporter gets to deliver its final flush before the process exits.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background loop on the current tokio runtime
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Completes once shutdown has been requested
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of loops that have not returned yet
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown and wait for every spawned loop to return
    pub async fn shutdown(&self) {
        info!(tasks = self.tasks.len(), "stopping background telemetry tasks");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let tasks = BackgroundTasks::new();
        let clean = Arc::new(AtomicBool::new(false));

        let task_handle = tasks.clone();
        let task_clean = Arc::clone(&clean);
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = task_handle.cancelled() => {
                        // simulate a final flush
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        task_clean.store(true, Ordering::SeqCst);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                }
            }
        });
        assert_eq!(tasks.len(), 1);
        assert!(!tasks.is_shutdown());

        tasks.shutdown().await;

        assert!(clean.load(Ordering::SeqCst), "task did not finish cleanly");
        assert!(tasks.is_shutdown());
        assert!(tasks.is_empty());
    }
}
