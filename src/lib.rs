//! Building blocks for the FlowScope operator.
//!
//! The operator reconciles a declarative flow-collection resource into
//! deployed collection agents, a processing pipeline, and their supporting
//! objects. The piece that lives here is the [`narrowcache`]: a per-object
//! read/watch cache sitting between the controllers and the cluster API,
//! so that watching a single ConfigMap or Secret never costs a
//! collection-wide informer.

#![warn(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod narrowcache;

pub(crate) mod internal_events;

/// Catch-all boxed error, used where the concrete failure type is opaque.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
