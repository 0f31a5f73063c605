//! Serialized task queue
//!
//! Admits one task at a time in FIFO order and waits a fixed spacing
//! between tasks so bursts of submissions do not hammer a rate-limited
//! backend. Clones share the same queue.

use crate::clock::{Timer, TokioTimer};
use crate::error::{LockerError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Default pause between two admitted tasks
pub const DEFAULT_SPACING: Duration = Duration::from_millis(1000);

type Task = BoxFuture<'static, ()>;

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    draining: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    timer: Arc<dyn Timer>,
    spacing: Duration,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// FIFO queue that runs at most one task at a time.
///
/// # Example
///
/// ```rust,ignore
/// let queue = TaskQueue::new();
/// let token = queue.run(async move { api.register(&profile).await }).await?;
/// ```
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    /// Queue with the default spacing on the Tokio clock
    pub fn new() -> Self {
        Self::with_timer(Arc::new(TokioTimer), DEFAULT_SPACING)
    }

    pub fn with_timer(timer: Arc<dyn Timer>, spacing: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                timer,
                spacing,
            }),
        }
    }

    /// Append a task. Starts draining if the queue was idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let start_draining = {
            let mut state = self.inner.state();
            state.pending.push_back(task.boxed());
            debug!(pending = state.pending.len(), "Task enqueued");
            !std::mem::replace(&mut state.draining, true)
        };

        if start_draining {
            tokio::spawn(Self::drain(self.inner.clone()));
        }
    }

    /// Enqueue a task and wait for its result.
    pub async fn run<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(async move {
            let _ = tx.send(task.await);
        });

        rx.await
            .map_err(|_| LockerError::Network("queued task aborted before completing".into()))?
    }

    /// Number of tasks waiting for admission
    pub fn pending(&self) -> usize {
        self.inner.state().pending.len()
    }

    /// Whether a drain loop is currently active
    pub fn is_draining(&self) -> bool {
        self.inner.state().draining
    }

    async fn drain(inner: Arc<Inner>) {
        loop {
            let next = {
                let mut state = inner.state();
                match state.pending.pop_front() {
                    Some(task) => task,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            if AssertUnwindSafe(next).catch_unwind().await.is_err() {
                error!("Queued task panicked; continuing with next task");
            }

            inner.timer.sleep(inner.spacing).await;
        }
    }
}
