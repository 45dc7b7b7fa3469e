//! Batch registry: one live window per batch identifier.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::resolver::{BatchKey, BatchResolver, BatchValue, FnResolver, ResolverResult};
use super::task::BatchHandle;
use super::trigger::Trigger;
use super::window::BatchWindow;
use crate::config::EnvConfig;
use crate::telemetry::{BatchStats, BatchStatsSnapshot};

struct RegistryInner<K, V> {
    windows: DashMap<String, Arc<BatchWindow<K, V>>>,
    trigger: Trigger,
    stats: Arc<BatchStats>,
}

/// Maps batch identifiers to their currently open window.
///
/// Each registry is its own namespace; clones share the same map. A window
/// evicts itself once its flush has settled every task, so the next `add`
/// for the same identifier opens a fresh window.
pub struct BatchRegistry<K, V> {
    inner: Arc<RegistryInner<K, V>>,
}

impl<K, V> Clone for BatchRegistry<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V> fmt::Debug for BatchRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRegistry")
            .field("windows", &self.inner.windows.len())
            .field("trigger", &self.inner.trigger)
            .finish()
    }
}

impl<K: BatchKey, V: BatchValue> BatchRegistry<K, V> {
    pub fn new() -> Self {
        Self::with_trigger(Trigger::default())
    }

    pub fn with_trigger(trigger: Trigger) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                windows: DashMap::new(),
                trigger,
                stats: Arc::new(BatchStats::new()),
            }),
        }
    }

    /// Build a registry whose trigger follows the loaded configuration.
    pub fn from_config(config: &EnvConfig) -> Self {
        Self::with_trigger(config.trigger())
    }

    /// Return the open window for `name`, creating one if needed.
    ///
    /// `resolver` is attached only if the window has none yet. A window that
    /// has already taken its snapshot is replaced, never reused.
    pub fn get_or_create(
        &self,
        name: &str,
        resolver: Option<Arc<dyn BatchResolver<K, V>>>,
    ) -> Arc<BatchWindow<K, V>> {
        match self.inner.windows.entry(name.to_string()) {
            Entry::Occupied(entry) if entry.get().is_open() => {
                let window = Arc::clone(entry.get());
                if let Some(resolver) = resolver {
                    window.set_resolver(resolver);
                }
                window
            }
            Entry::Occupied(mut entry) => {
                let window = self.new_window(name, resolver);
                entry.insert(Arc::clone(&window));
                window
            }
            Entry::Vacant(entry) => {
                let window = self.new_window(name, resolver);
                entry.insert(Arc::clone(&window));
                window
            }
        }
    }

    fn new_window(
        &self,
        name: &str,
        resolver: Option<Arc<dyn BatchResolver<K, V>>>,
    ) -> Arc<BatchWindow<K, V>> {
        let window = BatchWindow::with_stats(
            Arc::from(name),
            self.inner.trigger.clone(),
            Arc::clone(&self.inner.stats),
        );
        if let Some(resolver) = resolver {
            window.set_resolver(resolver);
        }

        let registry: Weak<RegistryInner<K, V>> = Arc::downgrade(&self.inner);
        let key = name.to_string();
        let window_id = window.id();
        window.set_cleanup(move || {
            if let Some(registry) = registry.upgrade() {
                registry.windows.remove_if(&key, |_, w| w.id() == window_id);
            }
        });
        window
    }

    /// Open the batch `name`, resolving its keys with `resolver`.
    ///
    /// Calls made before the batch flushes share one window; the resolver of
    /// the first call is the one used. Opening registers the window at once,
    /// so the identifier's entry stays in the registry until that window has
    /// flushed. A batch that is opened but never added to keeps its entry
    /// until the next `add` for the same identifier.
    pub fn open_batch<F, Fut>(&self, name: &str, resolver: F) -> Batch<K, V>
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult<K, V>> + Send + 'static,
    {
        self.open_batch_with(name, Arc::new(FnResolver::new(resolver)))
    }

    /// Like [`open_batch`](Self::open_batch) for an existing resolver object.
    pub fn open_batch_with(&self, name: &str, resolver: Arc<dyn BatchResolver<K, V>>) -> Batch<K, V> {
        let window = self.get_or_create(name, Some(Arc::clone(&resolver)));
        Batch {
            registry: self.clone(),
            name: name.to_string(),
            resolver,
            window,
        }
    }

    /// Whether `name` currently has an unsettled window.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.windows.contains_key(name)
    }

    /// Number of identifiers with an unsettled window.
    pub fn len(&self) -> usize {
        self.inner.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.windows.is_empty()
    }

    pub fn trigger(&self) -> &Trigger {
        &self.inner.trigger
    }

    pub fn stats(&self) -> BatchStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl<K: BatchKey, V: BatchValue> Default for BatchRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-facing handle to a named batch.
pub struct Batch<K, V> {
    registry: BatchRegistry<K, V>,
    name: String,
    resolver: Arc<dyn BatchResolver<K, V>>,
    window: Arc<BatchWindow<K, V>>,
}

impl<K, V> fmt::Debug for Batch<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("name", &self.name)
            .field("window", &self.window)
            .finish()
    }
}

impl<K: BatchKey, V: BatchValue> Batch<K, V> {
    /// Queue `key` for the next flush of this batch.
    ///
    /// If the window this batch was opened on has already flushed, the key
    /// goes into a fresh window for the same identifier, resolved with this
    /// batch's resolver.
    pub fn add(&self, key: K) -> BatchHandle<V> {
        let mut key = match self.window.try_add(key) {
            Ok(handle) => return handle,
            Err(key) => key,
        };
        // The fresh window can start flushing on another worker before the
        // key lands; keep going until some window takes it.
        loop {
            let window = self
                .registry
                .get_or_create(&self.name, Some(Arc::clone(&self.resolver)));
            match window.try_add(key) {
                Ok(handle) => return handle,
                Err(returned) => key = returned,
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The window this batch was opened on.
    pub fn window(&self) -> &Arc<BatchWindow<K, V>> {
        &self.window
    }

    /// Id of the window this batch was opened on.
    pub fn window_id(&self) -> u64 {
        self.window.id()
    }
}
