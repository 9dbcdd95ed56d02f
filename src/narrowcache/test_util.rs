//! Shared fixtures for narrow cache tests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;

use super::capability::{Capability, FetchFuture, WatchFuture};
use super::error::{FetchError, GetError};
use super::event::{EventHandler, ObjectEvent, ReconcileRequest, ResourceEvent, WorkQueue};
use super::object::{ApiObject, ErasedObject, ObjectKey, ResourceKind, SharedObject};
use super::ObjectClient;

pub(crate) fn trace_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// The managed test kind.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Widget {
    pub(crate) revision: u32,
}

impl ApiObject for Widget {
    fn resource_kind() -> ResourceKind {
        ResourceKind::new("test", "v1", "Widget")
    }
}

/// Claims the same kind as [`Widget`] while being a different type.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Imposter;

impl ApiObject for Imposter {
    fn resource_kind() -> ResourceKind {
        Widget::resource_kind()
    }
}

/// A kind no capability is registered for.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Loose {
    pub(crate) label: String,
}

impl ApiObject for Loose {
    fn resource_kind() -> ResourceKind {
        ResourceKind::new("test", "v1", "Loose")
    }
}

pub(crate) fn added(revision: u32) -> ObjectEvent {
    ObjectEvent::Added(Arc::new(Widget { revision }))
}

pub(crate) fn modified(revision: u32) -> ObjectEvent {
    ObjectEvent::Modified(Arc::new(Widget { revision }))
}

pub(crate) fn deleted(revision: u32) -> ObjectEvent {
    ObjectEvent::Deleted(Arc::new(Widget { revision }))
}

/// Scripted stand-in for the API server behind a [`Widget`] capability.
///
/// Fetches serve the current `object`; every watch-open registers a fresh
/// stream, and [`send`](Self::send) fans an event out to all of them.
pub(crate) struct MockRemote {
    object: Mutex<Option<Widget>>,
    fail_fetches: AtomicBool,
    fetches: AtomicUsize,
    watches: AtomicUsize,
    streams: Mutex<Vec<mpsc::UnboundedSender<ObjectEvent>>>,
}

impl MockRemote {
    pub(crate) fn new(object: Option<Widget>) -> Arc<Self> {
        Arc::new(Self {
            object: Mutex::new(object),
            fail_fetches: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            watches: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_object(&self, object: Option<Widget>) {
        *self.object.lock().unwrap() = object;
    }

    pub(crate) fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn watches(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    /// Deliver one event to every open watch stream.
    pub(crate) fn send(&self, event: ObjectEvent) {
        for stream in self.streams.lock().unwrap().iter() {
            let _ = stream.unbounded_send(event.clone());
        }
    }

    /// Terminate every open watch stream.
    pub(crate) fn close_streams(&self) {
        self.streams.lock().unwrap().clear();
    }

    pub(crate) fn capability(self: &Arc<Self>) -> Capability {
        let fetch_remote = Arc::clone(self);
        let watch_remote = Arc::clone(self);
        Capability::new(
            Widget::resource_kind(),
            move |_key| -> FetchFuture {
                let remote = Arc::clone(&fetch_remote);
                Box::pin(async move {
                    remote.fetches.fetch_add(1, Ordering::SeqCst);
                    if remote.fail_fetches.load(Ordering::SeqCst) {
                        return Err(FetchError::Transient {
                            source: "simulated network failure".into(),
                        });
                    }
                    match remote.object.lock().unwrap().clone() {
                        Some(widget) => Ok(Box::new(widget) as ErasedObject),
                        None => Err(FetchError::NotFound),
                    }
                })
            },
            move |_key| -> WatchFuture {
                let remote = Arc::clone(&watch_remote);
                Box::pin(async move {
                    remote.watches.fetch_add(1, Ordering::SeqCst);
                    let (sender, receiver) = mpsc::unbounded();
                    remote.streams.lock().unwrap().push(sender);
                    Ok(receiver.boxed())
                })
            },
        )
    }
}

/// Pass-through delegate serving [`Loose`] objects, counting its calls.
#[derive(Default)]
pub(crate) struct MockDelegate {
    object: Mutex<Option<Loose>>,
    calls: AtomicUsize,
}

impl MockDelegate {
    pub(crate) fn set_object(&self, object: Option<Loose>) {
        *self.object.lock().unwrap() = object;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectClient for Arc<MockDelegate> {
    async fn get_erased(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
    ) -> Result<ErasedObject, GetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.object.lock().unwrap().clone() {
            Some(loose) => Ok(Box::new(loose)),
            None => Err(GetError::NotFound {
                kind: kind.clone(),
                key: key.clone(),
            }),
        }
    }
}

/// Handler recording the operation sequence it observes.
pub(crate) struct RecordingHandler {
    ops: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: &ResourceEvent, queue: &dyn WorkQueue) {
        let tag = match event {
            ResourceEvent::Created { object } => format!("create:{}", revision(object)),
            ResourceEvent::Updated { new, .. } => format!("update:{}", revision(new)),
            ResourceEvent::Deleted { .. } => "delete".to_owned(),
        };
        self.ops.lock().unwrap().push(tag);
        // A change to a watched object always wakes the owning collection.
        queue.enqueue(ReconcileRequest {
            key: ObjectKey::namespaced("flowscope", "flow-collection"),
        });
    }
}

fn revision(object: &SharedObject) -> u32 {
    object
        .downcast_ref::<Widget>()
        .map(|widget| widget.revision)
        .unwrap_or_default()
}

/// Queue recording enqueued requests.
#[derive(Default)]
pub(crate) struct RecordingQueue {
    requests: Mutex<Vec<ReconcileRequest>>,
}

impl RecordingQueue {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn requests(&self) -> Vec<ReconcileRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl WorkQueue for RecordingQueue {
    fn enqueue(&self, request: ReconcileRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub(crate) async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if check().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
