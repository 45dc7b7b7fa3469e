//! Pending task type and the caller-side handle it completes.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use tokio::sync::oneshot;

use super::error::BatchError;

/// Sender half delivering a task's outcome to its caller.
pub(crate) type TaskTx<V> = oneshot::Sender<Result<V, BatchError>>;
/// Receiver half awaited by the caller.
pub(crate) type TaskRx<V> = oneshot::Receiver<Result<V, BatchError>>;

/// One outstanding caller request, owned by its window until flush.
///
/// `resolve` and `reject` consume the task, so an outcome is delivered
/// at most once.
pub(crate) struct PendingTask<V> {
    tx: TaskTx<V>,
    pub(crate) enqueued_at: Instant,
}

impl<V> fmt::Debug for PendingTask<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("enqueued_at", &self.enqueued_at)
            .field("caller_gone", &self.tx.is_closed())
            .finish()
    }
}

impl<V> PendingTask<V> {
    /// Create a task and the handle its caller will await.
    pub(crate) fn new(batch: Arc<str>) -> (Self, BatchHandle<V>) {
        let (tx, rx) = oneshot::channel();
        let task = Self { tx, enqueued_at: Instant::now() };
        (task, BatchHandle { batch, rx })
    }

    pub(crate) fn resolve(self, value: V) {
        // A dropped handle just means nobody is waiting anymore.
        let _ = self.tx.send(Ok(value));
    }

    pub(crate) fn reject(self, error: BatchError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Awaitable result of adding a key to a batch.
///
/// Resolves once the window holding the key has flushed.
#[must_use = "a batch handle does nothing unless awaited"]
pub struct BatchHandle<V> {
    batch: Arc<str>,
    rx: TaskRx<V>,
}

impl<V> BatchHandle<V> {
    /// A handle that is already rejected with `error`.
    pub(crate) fn rejected(batch: Arc<str>, error: BatchError) -> Self {
        let (task, handle) = PendingTask::new(batch);
        task.reject(error);
        handle
    }

    /// Identifier of the batch this handle belongs to.
    pub fn batch(&self) -> &str {
        &self.batch
    }
}

impl<V> fmt::Debug for BatchHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle").field("batch", &self.batch).finish()
    }
}

impl<V> Future for BatchHandle<V> {
    type Output = Result<V, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match ready!(Pin::new(&mut this.rx).poll(cx)) {
            Ok(outcome) => Poll::Ready(outcome),
            Err(_) => Poll::Ready(Err(BatchError::Abandoned {
                batch: this.batch.to_string(),
            })),
        }
    }
}
