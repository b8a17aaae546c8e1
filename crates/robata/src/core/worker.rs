//! Module for handling background dispatch tasks.

use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, sync::Notify};
use tracing::debug;

/// A handle for managing a background worker task that forms and runs batch groups.
///
/// The worker observes a shared `running` flag and sleeps on a [`Notify`]
/// between groups. Shutting down clears the flag and wakes the worker so it
/// can exit after the group it is currently running, if any.
///
/// # Example
///
/// ```ignore
/// let worker = BatchWorkerHandle::new("predict", |running, notifier| {
///     tokio::spawn(async move {
///         while running.load(Ordering::SeqCst) {
///             notifier.notified().await;
///             // form and run a group
///         }
///     })
/// });
///
/// worker.notify();
/// // worker is shut down when dropped
/// ```
pub(crate) struct BatchWorkerHandle {
    /// Name used in log lines
    name: String,

    /// Flag indicating whether the background task should continue running
    running: Arc<AtomicBool>,

    /// Handle to the spawned background task, becomes `None` after shutdown is initiated
    handle: Mutex<Option<JoinHandle<()>>>,

    /// Notification mechanism to wake up the background task
    notifier: Arc<Notify>,
}

impl BatchWorkerHandle {
    /// Creates a new `BatchWorkerHandle` by spawning a background task.
    ///
    /// `task` receives the running flag and the notifier and is responsible
    /// for spawning the actual background task.
    pub fn new<F>(name: impl Into<String>, task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            name: name.into(),
            running,
            handle: Mutex::new(Some(handle)),
            notifier,
        }
    }

    /// Wakes the background task so it picks up newly queued work.
    pub fn notify(&self) {
        self.notifier.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the background task. Safe to call more than once.
    ///
    /// The task is detached rather than awaited: a group that is already
    /// executing finishes and delivers its results before the task exits.
    pub fn shutdown(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.notifier.notify_one();

        if let Some(handle) = self.handle.lock().take() {
            drop(handle);
        }
        if was_running {
            debug!(worker = %self.name, "dispatch worker shut down");
        }
    }
}

impl Drop for BatchWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time;

    fn waiting_worker(exited: Arc<AtomicBool>) -> BatchWorkerHandle {
        BatchWorkerHandle::new("test", move |running, notifier| {
            tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    notifier.notified().await;
                }
                exited.store(true, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_worker_starts_running() {
        let worker = waiting_worker(Arc::new(AtomicBool::new(false)));
        assert!(worker.is_running());
    }

    #[tokio::test]
    async fn test_worker_notifies() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let worker = BatchWorkerHandle::new("test", |running, notifier| {
            tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    notifier.notified().await;
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }
            })
        });

        time::sleep(Duration::from_millis(50)).await;
        worker.notify();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        worker.notify();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_shutdown() {
        let exited = Arc::new(AtomicBool::new(false));
        let worker = waiting_worker(exited.clone());

        worker.notify();
        time::sleep(Duration::from_millis(50)).await;

        worker.shutdown();
        time::sleep(Duration::from_millis(100)).await;

        assert!(!worker.is_running());
        assert!(exited.load(Ordering::SeqCst));
        assert!(worker.handle.lock().is_none());
    }

    #[tokio::test]
    async fn test_worker_drop_triggers_shutdown() {
        let exited = Arc::new(AtomicBool::new(false));
        {
            let worker = waiting_worker(exited.clone());
            worker.notify();
            time::sleep(Duration::from_millis(50)).await;
        }

        time::sleep(Duration::from_millis(100)).await;
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_multiple_shutdowns() {
        let worker = waiting_worker(Arc::new(AtomicBool::new(false)));
        worker.shutdown();
        worker.shutdown();
        worker.shutdown();
        assert!(!worker.is_running());
    }
}
