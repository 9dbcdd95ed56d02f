//! Per-kind fetch/watch capabilities, registered once at startup.

use std::collections::hash_map::{Entry, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;

use super::error::{DuplicateKindError, FetchError};
use super::event::ObjectEventStream;
use super::object::{ErasedObject, ObjectKey, ResourceKind};

/// Future returned by a capability's single-object fetch.
pub type FetchFuture = BoxFuture<'static, Result<ErasedObject, FetchError>>;

/// Future returned by a capability's watch-open.
pub type WatchFuture = BoxFuture<'static, Result<ObjectEventStream, FetchError>>;

type FetchFn = dyn Fn(&ObjectKey) -> FetchFuture + Send + Sync;
type WatchFn = dyn Fn(&ObjectKey) -> WatchFuture + Send + Sync;

/// The fetch and watch-open operations for one managed kind.
///
/// Both operations address exactly one object; the cache never lists.
#[derive(Clone)]
pub struct Capability {
    kind: ResourceKind,
    fetch: Arc<FetchFn>,
    watch: Arc<WatchFn>,
}

impl Capability {
    /// Build a capability from its two operations.
    pub fn new<F, W>(kind: ResourceKind, fetch: F, watch: W) -> Self
    where
        F: Fn(&ObjectKey) -> FetchFuture + Send + Sync + 'static,
        W: Fn(&ObjectKey) -> WatchFuture + Send + Sync + 'static,
    {
        Self {
            kind,
            fetch: Arc::new(fetch),
            watch: Arc::new(watch),
        }
    }

    /// The kind this capability serves.
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub(crate) fn fetch(&self, key: &ObjectKey) -> FetchFuture {
        (self.fetch)(key)
    }

    pub(crate) fn watch(&self, key: &ObjectKey) -> WatchFuture {
        (self.watch)(key)
    }
}

/// The set of kinds the cache intercepts. Append-only at startup, read-only
/// once the cache service owns it.
#[derive(Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<ResourceKind, Capability>,
}

impl CapabilityTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one capability.
    ///
    /// Registering a kind twice is an error, never a silent override.
    pub fn register(&mut self, capability: Capability) -> Result<(), DuplicateKindError> {
        match self.entries.entry(capability.kind().clone()) {
            Entry::Occupied(entry) => Err(DuplicateKindError {
                kind: entry.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(capability);
                Ok(())
            }
        }
    }

    /// Whether this kind is served from the cache rather than the delegate.
    pub fn is_managed(&self, kind: &ResourceKind) -> bool {
        self.entries.contains_key(kind)
    }

    pub(crate) fn lookup(&self, kind: &ResourceKind) -> Option<&Capability> {
        self.entries.get(kind)
    }
}
