//! Watch events and the seams toward the reconciliation framework.

use futures::stream::BoxStream;

use super::object::{ObjectKey, SharedObject};

/// A single change observed on a watched object.
#[derive(Clone)]
pub enum ObjectEvent {
    /// The object appeared.
    Added(SharedObject),
    /// The object changed.
    Modified(SharedObject),
    /// The object is gone; the payload is its last observed state.
    Deleted(SharedObject),
}

/// The stream a watch capability yields until the server closes it.
pub type ObjectEventStream = BoxStream<'static, ObjectEvent>;

/// A change notification delivered to registered consumers.
#[derive(Clone)]
pub enum ResourceEvent {
    /// First observation of the object after it was unknown or absent.
    Created {
        /// The newly observed object.
        object: SharedObject,
    },
    /// The object changed.
    Updated {
        /// The previously cached state.
        old: SharedObject,
        /// The state after the change.
        new: SharedObject,
    },
    /// The object was deleted.
    Deleted {
        /// The last state observed before deletion.
        object: SharedObject,
    },
}

/// One reconcile work item, addressed by object key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// The object to reconcile.
    pub key: ObjectKey,
}

/// A controller's work queue.
///
/// Rate limiting and deduplication live behind this seam; the cache applies
/// no backpressure of its own.
pub trait WorkQueue: Send + Sync {
    /// Enqueue one reconcile request.
    fn enqueue(&self, request: ReconcileRequest);
}

/// A controller's event handler, deciding which requests a change enqueues.
///
/// Handlers for one object are invoked by that object's single update task:
/// strictly in watch-delivery order, never concurrently.
pub trait EventHandler: Send + Sync {
    /// React to one change of the watched object.
    fn handle(&self, event: &ResourceEvent, queue: &dyn WorkQueue);
}
