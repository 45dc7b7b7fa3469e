//! Configuration loading from environment variables.
//!
//! All configuration values are loaded from `NEXT_BATCH_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `NEXT_BATCH_TRIGGER` | next_tick | Flush trigger: `next_tick`, `immediate` or `timer` |
//! | `NEXT_BATCH_TIMER_MS` | 1 | Window length in `timer` mode (ms) |
//! | `NEXT_BATCH_LOG_LEVEL` | info | Tracing filter directive |
//! | `NEXT_BATCH_LOG_FORMAT` | json | Log format: `json` or `pretty` |

use std::time::Duration;

use serde::Serialize;

use crate::scheduler::{Trigger, TriggerMode};
use crate::telemetry::{LogConfig, LogFormat};

/// Upper bound for the timer window.
const MAX_TIMER_MS: u64 = 60_000;

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub trigger_mode: TriggerMode,
    pub timer_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Flush trigger settings loaded from env.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEnvConfig {
    pub mode: TriggerMode,
    pub timer: Duration,
}

impl Default for TriggerEnvConfig {
    fn default() -> Self {
        Self { mode: TriggerMode::NextTick, timer: Duration::from_millis(1) }
    }
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub trigger: TriggerEnvConfig,
    pub log: LogConfig,
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse any `FromStr` env var, returning `default` on missing or invalid.
fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load trigger configuration from environment.
fn load_trigger_config() -> TriggerEnvConfig {
    let mode = parse_or("NEXT_BATCH_TRIGGER", TriggerMode::NextTick);
    let timer_ms = parse_u64("NEXT_BATCH_TIMER_MS", 1).min(MAX_TIMER_MS);
    TriggerEnvConfig { mode, timer: Duration::from_millis(timer_ms) }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let level = std::env::var("NEXT_BATCH_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let format = parse_or("NEXT_BATCH_LOG_FORMAT", LogFormat::Json);
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        trigger: load_trigger_config(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Build the flush trigger described by this configuration.
    pub fn trigger(&self) -> Trigger {
        Trigger::new(self.trigger.mode).with_delay(self.trigger.timer)
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            trigger_mode: self.trigger.mode,
            timer_ms: self.trigger.timer.as_millis() as u64,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}
