//! Batch window: one coalescing cycle for one batch identifier.
//!
//! A window collects keys until its trigger fires, hands the snapshot to the
//! resolver exactly once, then settles every pending task and runs its
//! cleanup hook.
//!
//! ```text
//! Empty --add--> Accumulating --trigger--> Flushing --settled--> Completed
//! ```

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::Instrument;

use super::error::BatchError;
use super::resolver::{BatchKey, BatchResolver, BatchValue};
use super::task::{BatchHandle, PendingTask};
use super::trigger::{Activity, Trigger};
use crate::telemetry::{self, BatchStats, FlushOutcome, FlushSpan, SpanExt};

/// Hook run once after a window has settled all of its tasks.
pub type CleanupHook = Box<dyn FnOnce() + Send + 'static>;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a window. There is no way out of `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    Accumulating,
    Flushing,
    Completed,
}

struct WindowInner<K, V> {
    state: WindowState,
    /// Keys in insertion order, no duplicates.
    order: Vec<K>,
    pending: HashMap<K, PendingTask<V>>,
    resolver: Option<Arc<dyn BatchResolver<K, V>>>,
    cleanup: Option<CleanupHook>,
}

/// Keys and tasks taken out of a window when its flush starts.
struct Snapshot<K, V> {
    order: Vec<K>,
    pending: HashMap<K, PendingTask<V>>,
    resolver: Option<Arc<dyn BatchResolver<K, V>>>,
}

/// What a flush did with its tasks.
struct FlushReport {
    resolved: usize,
    rejected: usize,
    outcome: FlushOutcome,
    error: Option<BatchError>,
}

/// A single pending batch for one identifier.
pub struct BatchWindow<K, V> {
    id: u64,
    name: Arc<str>,
    trigger: Trigger,
    activity: Arc<Activity>,
    stats: Arc<BatchStats>,
    inner: Mutex<WindowInner<K, V>>,
}

impl<K, V> fmt::Debug for BatchWindow<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BatchWindow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("keys", &inner.order.len())
            .finish()
    }
}

impl<K: BatchKey, V: BatchValue> BatchWindow<K, V> {
    /// Create a standalone window with no resolver attached.
    pub fn new(name: impl Into<Arc<str>>, trigger: Trigger) -> Arc<Self> {
        Self::with_stats(name.into(), trigger, Arc::new(BatchStats::new()))
    }

    pub(crate) fn with_stats(name: Arc<str>, trigger: Trigger, stats: Arc<BatchStats>) -> Arc<Self> {
        let id = NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed);
        stats.window_opened();
        telemetry::record_window_opened(&name);
        tracing::debug!(batch = %name, window_id = id, "batch window opened");
        Arc::new(Self {
            id,
            name,
            trigger,
            activity: Arc::default(),
            stats,
            inner: Mutex::new(WindowInner {
                state: WindowState::Empty,
                order: Vec::new(),
                pending: HashMap::new(),
                resolver: None,
                cleanup: None,
            }),
        })
    }

    /// Process-unique id of this window instance.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Batch identifier this window collects keys for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WindowState {
        self.inner.lock().state
    }

    /// Whether `add` still lands in this window.
    pub fn is_open(&self) -> bool {
        matches!(self.state(), WindowState::Empty | WindowState::Accumulating)
    }

    /// Number of distinct keys waiting for the flush.
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_resolver(&self) -> bool {
        self.inner.lock().resolver.is_some()
    }

    /// Attach the resolver. The first one wins; returns false if one was
    /// already attached.
    pub fn set_resolver(&self, resolver: Arc<dyn BatchResolver<K, V>>) -> bool {
        let mut inner = self.inner.lock();
        if inner.resolver.is_some() {
            return false;
        }
        inner.resolver = Some(resolver);
        true
    }

    /// Attach the cleanup hook. The first one wins; returns false if one was
    /// already attached.
    pub fn set_cleanup(&self, hook: impl FnOnce() + Send + 'static) -> bool {
        let mut inner = self.inner.lock();
        if inner.cleanup.is_some() || inner.state == WindowState::Completed {
            return false;
        }
        inner.cleanup = Some(Box::new(hook));
        true
    }

    /// Add `key` to this window and get a handle for its value.
    ///
    /// Never blocks. A window that has already started flushing rejects the
    /// key with [`BatchError::WindowClosed`].
    pub fn add(self: &Arc<Self>, key: K) -> BatchHandle<V> {
        match self.try_add(key) {
            Ok(handle) => handle,
            Err(_) => BatchHandle::rejected(
                self.name.clone(),
                BatchError::WindowClosed { batch: self.name.to_string() },
            ),
        }
    }

    /// Add `key` if the window is still open; hands the key back otherwise.
    pub(crate) fn try_add(self: &Arc<Self>, key: K) -> Result<BatchHandle<V>, K> {
        let (task, handle) = PendingTask::new(self.name.clone());
        let (arm, superseded) = {
            let mut inner = self.inner.lock();
            let arm = match inner.state {
                WindowState::Empty => {
                    inner.state = WindowState::Accumulating;
                    true
                }
                WindowState::Accumulating => false,
                WindowState::Flushing | WindowState::Completed => return Err(key),
            };
            let superseded = match inner.pending.insert(key.clone(), task) {
                Some(previous) => {
                    // Last writer is the record handed to the resolver.
                    if let Some(slot) = inner.order.iter_mut().find(|k| **k == key) {
                        *slot = key.clone();
                    }
                    Some(previous)
                }
                None => {
                    inner.order.push(key.clone());
                    None
                }
            };
            self.activity.bump();
            (arm, superseded)
        };

        if let Some(previous) = superseded {
            tracing::debug!(batch = %self.name, key = ?key, "duplicate key replaced pending task");
            previous.reject(BatchError::Superseded {
                batch: self.name.to_string(),
                key: format!("{key:?}"),
            });
        }
        if arm {
            self.arm();
        }
        Ok(handle)
    }

    fn arm(self: &Arc<Self>) {
        let window = Arc::clone(self);
        let armed = self
            .trigger
            .arm(Arc::clone(&self.activity), move || FlushGuard::new(window).run());
        if armed.is_err() {
            tracing::warn!(batch = %self.name, window_id = self.id, "no runtime to flush batch");
            self.abandon(FlushOutcome::NoRuntime, || BatchError::NoRuntime {
                batch: self.name.to_string(),
            });
        }
    }

    /// Run the flush protocol. Only the first call does anything.
    pub(crate) async fn flush(&self) {
        let Some(snapshot) = self.take_snapshot() else {
            return;
        };
        let keys = snapshot.order.len();
        let span = FlushSpan::new(&self.name, self.id, keys);
        self.stats.flushed(keys);

        let started = Instant::now();
        let result = match snapshot.resolver {
            Some(resolver) => {
                self.call_resolver(resolver, snapshot.order.clone())
                    .instrument(span.clone())
                    .await
            }
            None => Err(BatchError::ResolverMissing { batch: self.name.to_string() }),
        };
        span.record("latency_ms", started.elapsed().as_millis() as u64);

        let report = match result {
            Ok(values) => self.distribute(snapshot.order, snapshot.pending, values),
            Err(error) => {
                let outcome = match &error {
                    BatchError::ResolverMissing { .. } => FlushOutcome::ResolverMissing,
                    BatchError::ResolverPanicked { .. } => FlushOutcome::ResolverPanicked,
                    _ => FlushOutcome::ResolverFailed,
                };
                Self::reject_all(snapshot.order, snapshot.pending, error, outcome)
            }
        };

        span.record_outcomes(report.resolved, report.rejected);
        span.record_result(&report.error.as_ref().map_or(Ok(()), Err));
        self.record(keys, &report);
        self.complete();
    }

    fn take_snapshot(&self) -> Option<Snapshot<K, V>> {
        let mut inner = self.inner.lock();
        if inner.state != WindowState::Accumulating {
            return None;
        }
        inner.state = WindowState::Flushing;
        Some(Snapshot {
            order: mem::take(&mut inner.order),
            pending: mem::take(&mut inner.pending),
            resolver: inner.resolver.clone(),
        })
    }

    async fn call_resolver(
        &self,
        resolver: Arc<dyn BatchResolver<K, V>>,
        keys: Vec<K>,
    ) -> Result<HashMap<K, V>, BatchError> {
        match AssertUnwindSafe(resolver.resolve(keys)).catch_unwind().await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(e)) => Err(BatchError::ResolverFailed {
                batch: self.name.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BatchError::ResolverPanicked { batch: self.name.to_string() }),
        }
    }

    /// Hand each task its value, or reject the whole window when the result
    /// shares no key with the snapshot.
    fn distribute(
        &self,
        order: Vec<K>,
        mut pending: HashMap<K, PendingTask<V>>,
        mut values: HashMap<K, V>,
    ) -> FlushReport {
        let matched = order.iter().filter(|k| values.contains_key(*k)).count();
        if matched == 0 {
            let error = BatchError::KeyMismatch {
                batch: self.name.to_string(),
                requested: order.len(),
            };
            return Self::reject_all(order, pending, error, FlushOutcome::KeyMismatch);
        }

        let mut resolved = 0;
        let mut rejected = 0;
        for key in order {
            let Some(task) = pending.remove(&key) else {
                continue;
            };
            match values.remove(&key) {
                Some(value) => {
                    task.resolve(value);
                    resolved += 1;
                }
                None => {
                    task.reject(BatchError::MissingValue {
                        batch: self.name.to_string(),
                        key: format!("{key:?}"),
                    });
                    rejected += 1;
                }
            }
        }
        if !values.is_empty() {
            tracing::debug!(
                batch = %self.name,
                unrequested = values.len(),
                "resolver returned keys that were not requested"
            );
        }

        FlushReport { resolved, rejected, outcome: FlushOutcome::Resolved, error: None }
    }

    fn reject_all(
        order: Vec<K>,
        mut pending: HashMap<K, PendingTask<V>>,
        error: BatchError,
        outcome: FlushOutcome,
    ) -> FlushReport {
        let mut rejected = 0;
        for key in order {
            if let Some(task) = pending.remove(&key) {
                task.reject(error.clone());
                rejected += 1;
            }
        }
        FlushReport { resolved: 0, rejected, outcome, error: Some(error) }
    }

    fn record(&self, keys: usize, report: &FlushReport) {
        self.stats.keys_resolved(report.resolved);
        self.stats.keys_rejected(report.rejected);
        if matches!(report.outcome, FlushOutcome::ResolverFailed | FlushOutcome::ResolverPanicked) {
            self.stats.resolver_failed();
        }
        telemetry::record_flush(&self.name, keys, report.outcome);
        telemetry::record_keys(&self.name, report.resolved, report.rejected);

        match &report.error {
            Some(error) => tracing::warn!(
                batch = %self.name,
                window_id = self.id,
                keys,
                error = %error,
                "batch flush rejected every key"
            ),
            None => tracing::debug!(
                batch = %self.name,
                window_id = self.id,
                keys,
                resolved = report.resolved,
                rejected = report.rejected,
                "batch flushed"
            ),
        }
    }

    /// Mark the window completed and run its cleanup hook, once.
    fn complete(&self) {
        let hook = {
            let mut inner = self.inner.lock();
            inner.state = WindowState::Completed;
            inner.cleanup.take()
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Reject whatever is still pending and complete the window without
    /// calling the resolver.
    fn abandon(&self, outcome: FlushOutcome, error: impl FnOnce() -> BatchError) {
        let (order, pending) = {
            let mut inner = self.inner.lock();
            if inner.state == WindowState::Completed {
                return;
            }
            inner.state = WindowState::Flushing;
            (mem::take(&mut inner.order), mem::take(&mut inner.pending))
        };
        let keys = order.len();
        let report = Self::reject_all(order, pending, error(), outcome);
        self.record(keys, &report);
        self.complete();
    }
}

/// Keeps a spawned flush accountable: if the task is dropped before the
/// flush finishes, the window is abandoned and its cleanup still runs.
struct FlushGuard<K: BatchKey, V: BatchValue> {
    window: Arc<BatchWindow<K, V>>,
    done: bool,
}

impl<K: BatchKey, V: BatchValue> FlushGuard<K, V> {
    fn new(window: Arc<BatchWindow<K, V>>) -> Self {
        Self { window, done: false }
    }

    async fn run(mut self) {
        self.window.flush().await;
        self.done = true;
    }
}

impl<K: BatchKey, V: BatchValue> Drop for FlushGuard<K, V> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let batch = self.window.name.to_string();
        tracing::warn!(batch = %batch, window_id = self.window.id, "batch flush dropped before completion");
        self.window.abandon(FlushOutcome::Abandoned, || BatchError::Abandoned { batch });
    }
}
