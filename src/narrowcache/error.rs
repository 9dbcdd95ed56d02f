//! Error taxonomy of the narrow cache.

use snafu::Snafu;

use super::object::{ObjectKey, ResourceKind};

/// Errors surfaced by the front door.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GetError {
    /// The object is confirmed absent, either by a live lookup or by a
    /// delete event recorded in the cache.
    #[snafu(display("{kind} {key} not found"), context(suffix(GetNotFoundSnafu)))]
    NotFound {
        /// Kind of the missing object.
        kind: ResourceKind,
        /// Key of the missing object.
        key: ObjectKey,
    },

    /// The live fetch or watch-open failed. Nothing was cached; whether to
    /// retry is the caller's call.
    #[snafu(display("live lookup of {kind} {key} failed"))]
    TransientFetch {
        /// Kind of the requested object.
        kind: ResourceKind,
        /// Key of the requested object.
        key: ObjectKey,
        /// The underlying API failure.
        source: crate::Error,
    },

    /// The cached object's concrete type differs from the requested one.
    /// This is a usage error, not a runtime condition.
    #[snafu(display("cache for {kind} holds a different type than requested"))]
    TypeMismatch {
        /// Kind whose cached object has an unexpected type.
        kind: ResourceKind,
    },
}

/// Errors reported by per-kind capabilities and by the general-purpose
/// delegate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    /// The API server reports no such object.
    #[snafu(display("object does not exist"))]
    NotFound,

    /// The API request itself failed.
    #[snafu(display("API request failed"))]
    Transient {
        /// The underlying failure.
        source: crate::Error,
    },
}

/// Returned when a kind is registered twice at startup.
#[derive(Debug, Snafu)]
#[snafu(display("a capability for {kind} is already registered"))]
pub struct DuplicateKindError {
    pub(crate) kind: ResourceKind,
}

/// Errors creating an event source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    /// Sources exist only for kinds present in the capability table.
    #[snafu(display("cannot create a source for unmanaged kind {kind}"))]
    Unmanaged {
        /// The kind no capability was registered for.
        kind: ResourceKind,
    },

    /// Priming the cache for the watched object failed.
    #[snafu(context(false), display("failed to prime the cache"))]
    Prime {
        /// The populate-sequence failure.
        source: GetError,
    },
}
