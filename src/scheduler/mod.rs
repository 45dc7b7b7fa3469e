//! Next-tick batch scheduling.
//!
//! Coalesces per-key requests issued during one scheduling turn into a single
//! resolver call per batch identifier, then fans the results back out.

mod error;
mod registry;
mod resolver;
mod task;
mod trigger;
mod window;

pub use error::{BatchError, ResolverError};
pub use registry::{Batch, BatchRegistry};
pub use resolver::{BatchKey, BatchResolver, BatchValue, FnResolver, ResolverResult};
pub use task::BatchHandle;
pub use trigger::{Trigger, TriggerMode};
pub use window::{BatchWindow, CleanupHook, WindowState};

#[cfg(test)]
mod window_tests;
