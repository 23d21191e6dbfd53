//! Module for handling the background scheduler task.

use std::sync::{Arc, atomic::{AtomicBool, Ordering}};

use parking_lot::Mutex;
use tokio::{sync::Notify, task::JoinHandle};

/// A handle for managing the background task that drives generation.
///
/// The task receives a shared running flag and a notifier when spawned. It
/// is expected to loop while the flag is set and to park on the notifier
/// when it has nothing to do.
pub(crate) struct WorkerHandle {
    /// Flag indicating whether the background task should continue running
    running: Arc<AtomicBool>,

    /// Handle to the spawned task, taken by the first `join`
    handle: Mutex<Option<JoinHandle<()>>>,

    /// Notification mechanism to wake up the background task
    notifier: Arc<Notify>,
}

impl WorkerHandle {
    /// Creates a new `WorkerHandle` by spawning a background task.
    ///
    /// `task` receives the running flag and the notifier and must return the
    /// `JoinHandle` of the task it spawned.
    pub(crate) fn new<F>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()>,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            running,
            handle: Mutex::new(Some(handle)),
            notifier,
        }
    }

    /// Wakes the task if it is parked. A wakeup sent while the task is busy
    /// is kept until its next park.
    pub(crate) fn notify(&self) {
        self.notifier.notify_one();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clears the running flag and wakes the task so it can observe it.
    ///
    /// Idempotent. Does not wait for the task; see [`join`](Self::join).
    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
    }

    /// Waits for the task to exit. Only the first caller waits; later calls
    /// return immediately.
    pub(crate) async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for WorkerHandle {
    /// Signals the background task to stop when the handle is dropped.
    fn drop(&mut self) {
        self.shutdown();
    }
}
