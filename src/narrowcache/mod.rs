//! A narrow, per-object read/watch cache layered over the cluster API.
//!
//! Controllers in this operator care about a handful of specific objects
//! (a certificate Secret here, a ConfigMap there), not whole collections.
//! Subscribing an informer to an entire kind to observe one object wastes
//! memory and watch bandwidth, so this cache intercepts reads for an
//! explicitly registered set of kinds and maintains one fetch+watch pair
//! per requested object instead:
//!
//! * a `get` for a managed kind is served from the cache, populating it on
//!   first use (live fetch, then a single-object watch);
//! * a `get` for any other kind is forwarded untouched to the
//!   general-purpose [`ObjectClient`];
//! * each cached object is kept fresh by its own background task, which
//!   also fans change notifications out to registered consumers; see
//!   [`NarrowCache::get_source`].
//!
//! The cache serves single objects only: no list queries, no label or
//! field selectors.

mod capability;
mod error;
mod event;
mod object;
mod source;
mod supervisor;

pub mod kinds;

#[cfg(test)]
mod test_util;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use stream_cancel::{Trigger, Tripwire};

use crate::internal_events::{emit, EntryInvalidated};

pub use capability::{Capability, CapabilityTable, FetchFuture, WatchFuture};
pub use error::{DuplicateKindError, FetchError, GetError, SourceError};
pub use event::{
    EventHandler, ObjectEvent, ObjectEventStream, ReconcileRequest, ResourceEvent, WorkQueue,
};
pub use object::{ApiObject, Cacheable, ErasedObject, ObjectKey, ResourceKind, SharedObject};
pub use source::NarrowSource;

/// The general-purpose client serving kinds the cache does not manage.
#[async_trait]
pub trait ObjectClient: Send + Sync + 'static {
    /// One uncached read of the object at `kind`/`key`.
    async fn get_erased(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
    ) -> Result<ErasedObject, GetError>;
}

/// Store key: one watched object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) kind: ResourceKind,
    pub(crate) key: ObjectKey,
}

#[derive(Clone)]
pub(crate) struct Consumer {
    pub(crate) handler: Arc<dyn EventHandler>,
    pub(crate) queue: Arc<dyn WorkQueue>,
}

pub(crate) struct CacheEntry {
    /// `None` marks confirmed absence after a delete event.
    pub(crate) object: Option<SharedObject>,
    pub(crate) consumers: Vec<Consumer>,
    /// Stops the entry's update task when the entry is dropped.
    pub(crate) _stop: Trigger,
}

type Store = HashMap<CacheKey, CacheEntry>;

pub(crate) struct Inner {
    capabilities: CapabilityTable,
    delegate: Box<dyn ObjectClient>,
    store: RwLock<Store>,
    /// Observed by every update task.
    pub(crate) shutdown: Tripwire,
    /// Dropping the trigger fires `shutdown`.
    stop_all: Mutex<Option<Trigger>>,
}

impl Inner {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_consumer(
        &self,
        cache_key: &CacheKey,
        handler: Arc<dyn EventHandler>,
        queue: Arc<dyn WorkQueue>,
    ) {
        let mut store = self.write();
        if let Some(entry) = store.get_mut(cache_key) {
            entry.consumers.push(Consumer { handler, queue });
        } else {
            debug!(
                message = "Skipped consumer registration, entry is gone.",
                kind = %cache_key.kind,
                key = %cache_key.key,
            );
        }
    }
}

/// Handle to the cache service.
///
/// Clones share one store. The service, including every update task, stops
/// on [`shutdown`](Self::shutdown) or when the last handle is dropped.
#[derive(Clone)]
pub struct NarrowCache {
    inner: Arc<Inner>,
}

impl NarrowCache {
    /// Create the service from its startup capability table and the
    /// general-purpose client used for unmanaged kinds.
    pub fn new(capabilities: CapabilityTable, delegate: impl ObjectClient) -> Self {
        let (trigger, shutdown) = Tripwire::new();
        Self {
            inner: Arc::new(Inner {
                capabilities,
                delegate: Box::new(delegate),
                store: RwLock::new(HashMap::new()),
                shutdown,
                stop_all: Mutex::new(Some(trigger)),
            }),
        }
    }

    /// Whether `kind` is served from this cache rather than the delegate.
    pub fn is_managed(&self, kind: &ResourceKind) -> bool {
        self.inner.capabilities.is_managed(kind)
    }

    /// Read one object.
    ///
    /// Managed kinds are served from the cache; the first read of a key
    /// blocks on a live fetch plus watch-open, later reads only take the
    /// store's read lock. The returned object is a deep copy; mutating it
    /// never touches cached state. Unmanaged kinds are forwarded verbatim
    /// to the delegate, whose error semantics pass through unchanged.
    pub async fn get<K: ApiObject>(&self, key: &ObjectKey) -> Result<K, GetError> {
        let kind = K::resource_kind();
        let Some(capability) = self.inner.capabilities.lookup(&kind) else {
            let erased = self.inner.delegate.get_erased(&kind, key).await?;
            return downcast_owned(erased).ok_or(GetError::TypeMismatch { kind });
        };
        let object = supervisor::ensure_entry(&self.inner, capability, &kind, key).await?;
        object
            .downcast_ref::<K>()
            .cloned()
            .ok_or(GetError::TypeMismatch { kind })
    }

    /// Create an event source for one managed object.
    ///
    /// Primes the cache (running the populate sequence if needed) so that a
    /// source, once started, observes every subsequent change to exactly
    /// this object without subscribing to the whole kind.
    pub async fn get_source<K: ApiObject>(
        &self,
        key: &ObjectKey,
    ) -> Result<NarrowSource, SourceError> {
        let kind = K::resource_kind();
        let Some(capability) = self.inner.capabilities.lookup(&kind) else {
            return Err(SourceError::Unmanaged { kind });
        };
        debug!(message = "Creating narrow source.", %kind, %key);
        supervisor::ensure_entry(&self.inner, capability, &kind, key).await?;
        Ok(NarrowSource::new(
            Arc::downgrade(&self.inner),
            CacheKey {
                kind,
                key: key.clone(),
            },
        ))
    }

    /// Drop the cache entry for one object and stop its watch.
    ///
    /// Used after a failed write, when the cached state may be the reason
    /// the write went wrong. The next `get` repopulates from a live fetch.
    /// Consumers registered against the entry are dropped with it.
    pub fn invalidate<K: ApiObject>(&self, key: &ObjectKey) {
        self.invalidate_kind(&K::resource_kind(), key);
    }

    /// Untyped variant of [`invalidate`](Self::invalidate).
    pub fn invalidate_kind(&self, kind: &ResourceKind, key: &ObjectKey) {
        let cache_key = CacheKey {
            kind: kind.clone(),
            key: key.clone(),
        };
        let removed = self.inner.write().remove(&cache_key);
        if removed.is_some() {
            emit(EntryInvalidated { kind, key });
        }
    }

    /// Stop every update task. Dropping the last handle has the same
    /// effect.
    pub fn shutdown(&self) {
        self.inner
            .stop_all
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn downcast_owned<K: ApiObject>(erased: ErasedObject) -> Option<K> {
    erased.into_any().downcast().ok().map(|object| *object)
}
