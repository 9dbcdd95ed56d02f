//! Adapter exposing one cache entry as a reconciliation event source.

use std::sync::{Arc, Weak};

use super::event::{EventHandler, WorkQueue};
use super::{CacheKey, Inner};

/// An event source scoped to exactly one object.
///
/// Created by [`NarrowCache::get_source`](super::NarrowCache::get_source),
/// which has already run the populate sequence for the object.
#[derive(Debug)]
pub struct NarrowSource {
    inner: Weak<Inner>,
    cache_key: CacheKey,
}

impl NarrowSource {
    pub(crate) fn new(inner: Weak<Inner>, cache_key: CacheKey) -> Self {
        Self { inner, cache_key }
    }

    /// Register `handler` against the controller's `queue`.
    ///
    /// From the moment this returns, every change to the object is handed
    /// to `handler` in watch-delivery order, never concurrently. There is
    /// no unregistration; the subscription lives as long as the cache
    /// service does.
    pub fn start(&self, handler: Arc<dyn EventHandler>, queue: Arc<dyn WorkQueue>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.add_consumer(&self.cache_key, handler, queue);
        }
    }
}
