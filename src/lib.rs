//! next-batch
//!
//! Coalesces per-key requests made during one scheduling turn into a single
//! resolver call, then hands each caller the value for its own key.
//!
//! # Model
//!
//! - **Batch window**: keys waiting for one flush of one batch identifier.
//! - **Registry**: at most one open window per identifier; a window evicts
//!   itself once its flush has settled every caller.
//! - **Trigger**: spawns the flush on the tokio runtime after the current
//!   turn, so every `add` issued in that turn lands in the same window.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use next_batch::{BatchRegistry, ResolverError};
//!
//! # async fn run() -> Result<(), next_batch::BatchError> {
//! let registry: BatchRegistry<u64, String> = BatchRegistry::new();
//! let users = registry.open_batch("users", |ids: Vec<u64>| async move {
//!     let found: HashMap<u64, String> = ids.into_iter().map(|id| (id, format!("user_{id}"))).collect();
//!     Ok::<_, ResolverError>(found)
//! });
//!
//! let first = users.add(1);
//! let second = users.add(2);
//! assert_eq!(first.await?, "user_1");
//! assert_eq!(second.await?, "user_2");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod scheduler;
pub mod telemetry;

pub use config::{EffectiveConfig, EnvConfig};
pub use scheduler::{
    Batch, BatchError, BatchHandle, BatchKey, BatchRegistry, BatchResolver, BatchValue,
    BatchWindow, FnResolver, ResolverError, ResolverResult, Trigger, TriggerMode, WindowState,
};
