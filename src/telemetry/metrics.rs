//! `metrics` facade recording for batch windows.
//!
//! No-ops unless the embedding application installs a recorder.

/// Outcome label for a flushed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Resolved,
    KeyMismatch,
    ResolverMissing,
    ResolverFailed,
    ResolverPanicked,
    NoRuntime,
    Abandoned,
}

impl FlushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::KeyMismatch => "key_mismatch",
            Self::ResolverMissing => "resolver_missing",
            Self::ResolverFailed => "resolver_failed",
            Self::ResolverPanicked => "resolver_panicked",
            Self::NoRuntime => "no_runtime",
            Self::Abandoned => "abandoned",
        }
    }
}

pub fn record_window_opened(batch: &str) {
    ::metrics::counter!("next_batch_windows_opened_total", "batch" => batch.to_string()).increment(1);
}

/// Record one completed flush and the size of its snapshot.
pub fn record_flush(batch: &str, keys: usize, outcome: FlushOutcome) {
    ::metrics::counter!(
        "next_batch_flushes_total",
        "batch" => batch.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
    ::metrics::histogram!("next_batch_flush_size", "batch" => batch.to_string()).record(keys as f64);
}

/// Record per-key outcomes of a flush.
pub fn record_keys(batch: &str, resolved: usize, rejected: usize) {
    if resolved > 0 {
        ::metrics::counter!("next_batch_keys_total", "batch" => batch.to_string(), "outcome" => "resolved")
            .increment(resolved as u64);
    }
    if rejected > 0 {
        ::metrics::counter!("next_batch_keys_total", "batch" => batch.to_string(), "outcome" => "rejected")
            .increment(rejected as u64);
    }
}
