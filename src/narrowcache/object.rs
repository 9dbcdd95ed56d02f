//! Object erasure and addressing.
//!
//! The store holds objects of several concrete types behind one erased
//! trait; typed access is restored at the front door via downcasting.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value the narrow cache can hold.
///
/// Implemented for every `Clone + PartialEq` type. `Clone` is the deep-copy
/// capability: every object handed to a caller is cloned out of the store,
/// so callers can never alias cached state.
pub trait Cacheable: Any + Send + Sync {
    /// Access the concrete object for downcasting.
    fn as_any(&self) -> &(dyn Any + Send + Sync);

    /// Consume the box and expose the concrete object.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Structural comparison against another erased object.
    ///
    /// Objects of different concrete types are never equal.
    fn eq_erased(&self, other: &dyn Cacheable) -> bool;
}

impl<T> Cacheable for T
where
    T: Any + Clone + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn eq_erased(&self, other: &dyn Cacheable) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

impl dyn Cacheable {
    /// Downcast to a concrete object type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// An owned type-erased object.
pub type ErasedObject = Box<dyn Cacheable>;

/// A shared type-erased object, as held by the store and carried by events.
pub type SharedObject = Arc<dyn Cacheable>;

/// A resource type bound to the kind it is served under.
///
/// Deployed kinds implement this in [`kinds`](super::kinds); test doubles
/// implement it manually.
pub trait ApiObject: Cacheable + Clone {
    /// The kind identifier this type binds to.
    fn resource_kind() -> ResourceKind;
}

/// Identifier of an API kind+version. Defined once at startup, immutable
/// afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    group: String,
    version: String,
    kind: String,
}

impl ResourceKind {
    /// Build a kind identifier from its group/version/kind triple. The core
    /// group is the empty string.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Derive the kind identifier from a typed kube resource.
    pub fn of<K>() -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self::new(K::group(&()), K::version(&()), K::kind(&()))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Namespace/name address of a single object.
///
/// Cluster-scoped objects use an empty namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace the object lives in; empty for cluster-scoped objects.
    pub namespace: String,
    /// Object name, unique within the namespace.
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object.
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object.
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
