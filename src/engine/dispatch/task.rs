use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::channels::StreamChannelStore;
use crate::engine::registry::ResultSetRegistry;
use crate::engine::types::ExecutionFailure;

struct Running {
    token: CancellationToken,
    finished: watch::Receiver<()>,
}

/// Held by a running execution. Dropping it wakes everyone waiting in
/// `TaskTracker::cancel`, so it must outlive the registry write of the outcome.
pub struct TaskSlot {
    token: CancellationToken,
    _finished: watch::Sender<()>,
}

impl TaskSlot {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// In-flight executions keyed by result set handle, and the single place their
/// outcome is written back to the registry.
///
/// Every token is a child of one root token, so `cancel_all` reaches work that is
/// registered concurrently with shutdown as well.
pub struct TaskTracker {
    root: CancellationToken,
    running: Mutex<HashMap<String, Running>>,
    registry: Arc<ResultSetRegistry>,
    channels: Arc<StreamChannelStore>,
}

impl TaskTracker {
    pub fn new(registry: Arc<ResultSetRegistry>, channels: Arc<StreamChannelStore>) -> Self {
        Self {
            root: CancellationToken::new(),
            running: Mutex::new(HashMap::new()),
            registry,
            channels,
        }
    }

    pub fn register(&self, handle: &str) -> TaskSlot {
        let token = self.root.child_token();
        let (finished_tx, finished_rx) = watch::channel(());
        self.running.lock().insert(
            handle.to_string(),
            Running {
                token: token.clone(),
                finished: finished_rx,
            },
        );
        TaskSlot {
            token,
            _finished: finished_tx,
        }
    }

    /// Records the outcome of `handle` and forgets it. A failed result set loses its
    /// channels, so tickets handed out before the failure stop resolving.
    pub fn finish(&self, handle: &str, outcome: Result<(), ExecutionFailure>) {
        let recorded = match outcome {
            Ok(()) => self.registry.complete(handle),
            Err(failure) => {
                let dropped = self.channels.drop_owner(handle);
                warn!(target: "glide::dispatch", handle, error = %failure, dropped_channels = dropped, "Execution failed");
                self.registry.fail(handle, failure)
            }
        };
        if let Err(e) = recorded {
            debug!(target: "glide::dispatch", handle, error = %e, "Outcome not recorded");
        }
        self.running.lock().remove(handle);
    }

    /// Cancels the execution of `handle` and waits up to `wait` for its outcome to be
    /// recorded. `None` when nothing runs under `handle`; otherwise whether it landed in time.
    pub async fn cancel(&self, handle: &str, wait: Duration) -> Option<bool> {
        let mut finished = {
            let running = self.running.lock();
            let task = running.get(handle)?;
            task.token.cancel();
            task.finished.clone()
        };
        info!(target: "glide::dispatch", handle, "Execution cancelled");
        // Resolves with an error once the task drops its slot.
        Some(tokio::time::timeout(wait, finished.changed()).await.is_ok())
    }

    pub fn cancel_all(&self) {
        let in_flight = self.in_flight();
        if in_flight > 0 {
            warn!(target: "glide::dispatch", in_flight, "Cancelling all in-flight executions");
        }
        self.root.cancel();
    }

    pub fn in_flight(&self) -> usize {
        self.running.lock().len()
    }

    /// Runs `work` in the background as the execution of `handle`.
    pub fn spawn<F>(self: &Arc<Self>, handle: &str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), ExecutionFailure>> + Send + 'static,
    {
        let task = ExecutionTask {
            handle: handle.to_string(),
            slot: self.register(handle),
            tracker: Arc::clone(self),
        };
        tokio::spawn(task.run(work))
    }
}

/// One deferred execution. Its outcome is written to the registry exactly once.
pub struct ExecutionTask {
    handle: String,
    slot: TaskSlot,
    tracker: Arc<TaskTracker>,
}

impl ExecutionTask {
    pub async fn run<F>(self, work: F)
    where
        F: Future<Output = Result<(), ExecutionFailure>> + Send,
    {
        let outcome = tokio::select! {
            biased;
            _ = self.slot.token.cancelled() => Err(ExecutionFailure::cancelled()),
            result = work => result,
        };
        self.tracker.finish(&self.handle, outcome);
        drop(self.slot);
    }
}
