//! Flush trigger: decides when the current turn is over.
//!
//! A window arms its trigger once, on its first key. The trigger spawns the
//! flush on a tokio runtime and defers it so that every `add` issued in the
//! same turn lands in the window first.

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Quiet period a stolen `NextTick` flush waits for before it stops
/// waiting on more adds.
const SETTLE_INTERVAL: Duration = Duration::from_millis(1);

/// How long a window stays open after its first key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Flush once the turn that armed the window is over.
    ///
    /// On a current-thread runtime this is a single yield. On a multi-thread
    /// runtime the flush may be picked up by another worker while the caller
    /// is still adding; it then waits until it runs on the caller's worker,
    /// or until the window has seen no new add for one settle interval
    /// (1ms). A turn that stalls longer than that between two adds is split.
    #[default]
    NextTick,
    /// Flush on the spawned task's first poll. On a multi-thread runtime
    /// this can cut a turn short.
    Immediate,
    /// Sleep for the trigger delay before flushing.
    Timer,
}

impl FromStr for TriggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next_tick" | "tick" => Ok(Self::NextTick),
            "immediate" => Ok(Self::Immediate),
            "timer" => Ok(Self::Timer),
            other => Err(format!("unknown trigger mode: {other}")),
        }
    }
}

/// Add counter shared by a window and its armed flush.
#[derive(Debug, Default)]
pub(crate) struct Activity(AtomicU64);

impl Activity {
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Arming failed: no runtime is reachable from the calling context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NoRuntime;

/// Spawns deferred flushes.
///
/// The runtime is chosen per arm: the caller's ambient runtime first, then
/// the configured fallback handle.
#[derive(Debug, Clone)]
pub struct Trigger {
    mode: TriggerMode,
    delay: Duration,
    fallback: Option<Handle>,
}

impl Trigger {
    pub fn new(mode: TriggerMode) -> Self {
        Self { mode, delay: Duration::from_millis(1), fallback: None }
    }

    /// Delay used by [`TriggerMode::Timer`].
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runtime used when `add` is called outside any tokio context.
    ///
    /// A multi-thread fallback needs its time driver enabled.
    pub fn with_fallback(mut self, handle: Handle) -> Self {
        self.fallback = Some(handle);
        self
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.fallback.clone())
    }

    /// Spawn the flush built by `make_flush` behind this trigger's deferral.
    ///
    /// `activity` is bumped by every add into the armed window. `make_flush`
    /// is only called once a runtime has been found.
    pub(crate) fn arm<F, Fut>(&self, activity: Arc<Activity>, make_flush: F) -> Result<(), NoRuntime>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime().ok_or(NoRuntime)?;
        let flush = make_flush();
        let mode = self.mode;
        let delay = self.delay;
        let flavor = handle.runtime_flavor();
        let origin = thread::current().id();
        handle.spawn(async move {
            match mode {
                TriggerMode::NextTick => settle_turn(flavor, origin, &activity).await,
                TriggerMode::Immediate => {}
                TriggerMode::Timer => tokio::time::sleep(delay).await,
            }
            flush.await;
        });
        Ok(())
    }
}

/// Wait until the turn running on `origin` can no longer add to the window.
///
/// A worker polls one task at a time, so running on `origin` means the
/// arming poll has returned.
async fn settle_turn(flavor: RuntimeFlavor, origin: ThreadId, activity: &Activity) {
    let ended = thread::current().id() == origin;
    tokio::task::yield_now().await;
    if flavor == RuntimeFlavor::CurrentThread || ended || thread::current().id() == origin {
        return;
    }

    let mut seen = activity.load();
    loop {
        tokio::time::sleep(SETTLE_INTERVAL).await;
        let now = activity.load();
        if now == seen || thread::current().id() == origin {
            return;
        }
        seen = now;
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new(TriggerMode::default())
    }
}
