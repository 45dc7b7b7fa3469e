//! Telemetry for batch scheduling.
//!
//! Provides structured logging, flush spans, `metrics` facade recording and
//! per-registry counters.

mod logging;
mod metrics;
mod spans;
mod stats;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_flush, record_keys, record_window_opened, FlushOutcome};
pub use spans::{FlushSpan, SpanExt};
pub use stats::{BatchStats, BatchStatsSnapshot};
