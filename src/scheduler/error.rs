//! Error types for batch scheduling.
//!
//! Every failure is delivered through the caller's own `BatchHandle`.
//! Nothing is raised out of `add` or out of the flush trigger.

use thiserror::Error;

/// Why a batched key did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("resolver not configured for batch: {batch}")]
    ResolverMissing { batch: String },

    #[error(
        "resolver for batch {batch} returned no key matching any of the {requested} requested keys; \
         the result map must be keyed by the exact keys passed to the resolver"
    )]
    KeyMismatch { batch: String, requested: usize },

    #[error("value missing for key: {key} in the map returned by the resolver for batch {batch}")]
    MissingValue { batch: String, key: String },

    #[error("resolver for batch {batch} failed: {reason}")]
    ResolverFailed { batch: String, reason: String },

    #[error("resolver for batch {batch} panicked")]
    ResolverPanicked { batch: String },

    #[error("key {key} was added to batch {batch} again before flush")]
    Superseded { batch: String, key: String },

    #[error("batch {batch} has already flushed and accepts no more keys")]
    WindowClosed { batch: String },

    #[error("no async runtime available to flush batch: {batch}")]
    NoRuntime { batch: String },

    #[error("batch {batch} was dropped before its flush completed")]
    Abandoned { batch: String },
}

impl BatchError {
    /// Identifier of the batch this error belongs to.
    pub fn batch(&self) -> &str {
        match self {
            Self::ResolverMissing { batch }
            | Self::KeyMismatch { batch, .. }
            | Self::MissingValue { batch, .. }
            | Self::ResolverFailed { batch, .. }
            | Self::ResolverPanicked { batch }
            | Self::Superseded { batch, .. }
            | Self::WindowClosed { batch }
            | Self::NoRuntime { batch }
            | Self::Abandoned { batch } => batch,
        }
    }

    /// Returns true if every task in the window received this error.
    pub fn is_batch_wide(&self) -> bool {
        !matches!(
            self,
            Self::MissingValue { .. } | Self::Superseded { .. } | Self::WindowClosed { .. }
        )
    }
}

/// Failure reported by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolverError {
    message: String,
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ResolverError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ResolverError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
