//! Span utilities and extension traits for batch flush tracing.
//!
//! Provides standardized span creation and result recording.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    /// Record how many keys of a flush resolved and rejected.
    fn record_outcomes(&self, resolved: usize, rejected: usize);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }

    fn record_outcomes(&self, resolved: usize, rejected: usize) {
        self.record("resolved", resolved as u64);
        self.record("rejected", rejected as u64);
    }
}

/// Factory for creating standardized flush spans.
pub struct FlushSpan;

impl FlushSpan {
    /// Create a new flush span with standard fields.
    ///
    /// Fields included:
    /// - `batch`: Batch identifier
    /// - `window_id`: Window instance within the registry
    /// - `keys`: Number of keys in the snapshot
    /// - `status`: To be filled in by `SpanExt::record_result`
    /// - `error.message`: To be filled in on error
    /// - `resolved` / `rejected`: Per-key outcome counts
    /// - `latency_ms`: Resolver latency
    pub fn new(batch: &str, window_id: u64, keys: usize) -> Span {
        info_span!(
            "batch_flush",
            batch = %batch,
            window_id = window_id,
            keys = keys,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            resolved = tracing::field::Empty,
            rejected = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
