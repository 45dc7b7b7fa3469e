//! Per-registry batch counters.
//!
//! Complements the `metrics` facade: values are kept here so a registry can
//! report on itself without an installed recorder.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of a registry's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatsSnapshot {
    pub windows_opened: u64,
    pub flushes: u64,
    pub keys_batched: u64,
    pub keys_resolved: u64,
    pub keys_rejected: u64,
    pub resolver_failures: u64,
    pub largest_batch: u64,
}

impl BatchStatsSnapshot {
    /// Serialize the snapshot as a JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Atomic counters shared by a registry and all of its windows.
#[derive(Debug, Default)]
pub struct BatchStats {
    windows_opened: AtomicU64,
    flushes: AtomicU64,
    keys_batched: AtomicU64,
    keys_resolved: AtomicU64,
    keys_rejected: AtomicU64,
    resolver_failures: AtomicU64,
    largest_batch: AtomicU64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn window_opened(&self) {
        self.windows_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn flushed(&self, keys: usize) {
        let keys = keys as u64;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.keys_batched.fetch_add(keys, Ordering::Relaxed);
        self.largest_batch.fetch_max(keys, Ordering::Relaxed);
    }

    pub(crate) fn keys_resolved(&self, n: usize) {
        self.keys_resolved.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn keys_rejected(&self, n: usize) {
        self.keys_rejected.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn resolver_failed(&self) {
        self.resolver_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            windows_opened: self.windows_opened.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            keys_batched: self.keys_batched.load(Ordering::Relaxed),
            keys_resolved: self.keys_resolved.load(Ordering::Relaxed),
            keys_rejected: self.keys_rejected.load(Ordering::Relaxed),
            resolver_failures: self.resolver_failures.load(Ordering::Relaxed),
            largest_batch: self.largest_batch.load(Ordering::Relaxed),
        }
    }
}
