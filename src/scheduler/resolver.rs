//! Resolver contract: one call per flushed window.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;

use async_trait::async_trait;

use super::error::ResolverError;

/// Bounds every batch key must satisfy.
///
/// Keys are matched by `Eq`/`Hash`, cloned once into the resolver's input,
/// and rendered with `Debug` when a value is reported missing.
pub trait BatchKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> BatchKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds every resolved value must satisfy.
pub trait BatchValue: Send + 'static {}

impl<T> BatchValue for T where T: Send + 'static {}

/// Result type produced by a resolver.
pub type ResolverResult<K, V> = Result<HashMap<K, V>, ResolverError>;

/// Loads values for a whole batch of keys at once.
///
/// Receives the batched keys in insertion order, without duplicates. The
/// returned map must be keyed by keys equal to the ones given; keys left out
/// are reported to their callers as missing.
#[async_trait]
pub trait BatchResolver<K, V>: Send + Sync {
    async fn resolve(&self, keys: Vec<K>) -> ResolverResult<K, V>;
}

/// Adapts an async closure into a [`BatchResolver`].
pub struct FnResolver<F> {
    f: F,
}

impl<F> FnResolver<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<K, V, F, Fut> BatchResolver<K, V> for FnResolver<F>
where
    K: BatchKey,
    V: BatchValue,
    F: Fn(Vec<K>) -> Fut + Send + Sync,
    Fut: Future<Output = ResolverResult<K, V>> + Send,
{
    async fn resolve(&self, keys: Vec<K>) -> ResolverResult<K, V> {
        (self.f)(keys).await
    }
}
