//! The populate sequence and the per-key update loop.
//!
//! Each cache entry is owned by exactly one background task. The task
//! applies watch events to the store, notifies registered consumers in
//! delivery order, and re-establishes the watch with exponential backoff
//! when the stream dies. It stops when the cache service shuts down or the
//! entry is invalidated.

use std::collections::hash_map::Entry;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{self, Select};
use futures::StreamExt;
use stream_cancel::Tripwire;
use tokio_retry::strategy::ExponentialBackoff;

use crate::internal_events::{
    emit, CacheMissLiveLookup, WatchEventApplied, WatchInterrupted, WatchResumeFailed,
    WatchResumed,
};

use super::capability::Capability;
use super::error::{FetchError, GetError};
use super::event::{ObjectEvent, ObjectEventStream, ResourceEvent};
use super::object::{ObjectKey, ResourceKind, SharedObject};
use super::{CacheEntry, CacheKey, Consumer, Inner};

/// Ensure a live entry exists for `key`, creating it on first use.
///
/// Returns the cached object, or `NotFound` for a confirmed-absent entry.
/// Fetch and watch-open failures propagate without caching anything, so the
/// next caller retries from scratch.
pub(super) async fn ensure_entry(
    inner: &Arc<Inner>,
    capability: &Capability,
    kind: &ResourceKind,
    key: &ObjectKey,
) -> Result<SharedObject, GetError> {
    let cache_key = CacheKey {
        kind: kind.clone(),
        key: key.clone(),
    };

    if let Some(state) = lookup(inner, &cache_key) {
        return state.ok_or_else(|| not_found(kind, key));
    }

    emit(CacheMissLiveLookup { kind, key });
    let fetched = capability
        .fetch(key)
        .await
        .map_err(|error| live_error(kind, key, error))?;
    let stream = capability
        .watch(key)
        .await
        .map_err(|error| live_error(kind, key, error))?;

    let object: SharedObject = Arc::from(fetched);

    let mut store = inner.write();
    match store.entry(cache_key.clone()) {
        Entry::Occupied(entry) => {
            // Lost the populate race. The winner's watch stays; ours is
            // closed when `stream` drops.
            entry.get().object.clone().ok_or_else(|| not_found(kind, key))
        }
        Entry::Vacant(slot) => {
            let (stop, stopped) = Tripwire::new();
            slot.insert(CacheEntry {
                object: Some(Arc::clone(&object)),
                consumers: Vec::new(),
                _stop: stop,
            });
            tokio::spawn(run(
                Arc::downgrade(inner),
                cache_key,
                capability.clone(),
                stream,
                inner.shutdown.clone(),
                stopped,
            ));
            Ok(object)
        }
    }
}

fn lookup(inner: &Inner, cache_key: &CacheKey) -> Option<Option<SharedObject>> {
    inner.read().get(cache_key).map(|entry| entry.object.clone())
}

fn not_found(kind: &ResourceKind, key: &ObjectKey) -> GetError {
    GetError::NotFound {
        kind: kind.clone(),
        key: key.clone(),
    }
}

fn live_error(kind: &ResourceKind, key: &ObjectKey, error: FetchError) -> GetError {
    match error {
        FetchError::NotFound => not_found(kind, key),
        FetchError::Transient { source } => GetError::TransientFetch {
            kind: kind.clone(),
            key: key.clone(),
            source,
        },
    }
}

type StopSignal = Select<Pin<Box<Tripwire>>, Pin<Box<Tripwire>>>;

async fn run(
    inner: Weak<Inner>,
    cache_key: CacheKey,
    capability: Capability,
    mut stream: ObjectEventStream,
    shutdown: Tripwire,
    stopped: Tripwire,
) {
    let mut stop = future::select(Box::pin(shutdown), Box::pin(stopped));

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => return,
            maybe = stream.next() => match maybe {
                Some(event) => {
                    if !apply_event(&inner, &cache_key, event) {
                        return;
                    }
                }
                None => {
                    emit(WatchInterrupted {
                        kind: &cache_key.kind,
                        key: &cache_key.key,
                    });
                    match resync(&inner, &cache_key, &capability, &mut stop).await {
                        Some(resumed) => stream = resumed,
                        None => return,
                    }
                }
            },
        }
    }
}

/// Apply one watch event to the store and notify consumers.
///
/// Returns `false` once the cache service is gone.
fn apply_event(inner: &Weak<Inner>, cache_key: &CacheKey, event: ObjectEvent) -> bool {
    let Some(inner) = inner.upgrade() else {
        return false;
    };

    let notify = {
        let mut store = inner.write();
        let Some(entry) = store.get_mut(cache_key) else {
            // Invalidated under us; the stop trigger fires shortly.
            return true;
        };
        match event {
            ObjectEvent::Added(object) | ObjectEvent::Modified(object) => {
                // Watch re-lists replay unchanged state; don't wake
                // consumers for it.
                if let Some(prior) = &entry.object {
                    if prior.eq_erased(object.as_ref()) {
                        return true;
                    }
                }
                let prior = entry.object.replace(Arc::clone(&object));
                let event = match prior {
                    None => ResourceEvent::Created { object },
                    Some(old) => ResourceEvent::Updated { old, new: object },
                };
                (event, entry.consumers.clone())
            }
            ObjectEvent::Deleted(object) => {
                entry.object = None;
                (ResourceEvent::Deleted { object }, entry.consumers.clone())
            }
        }
    };

    let (event, consumers) = notify;
    emit(WatchEventApplied {
        kind: &cache_key.kind,
        key: &cache_key.key,
        op: op_name(&event),
    });
    dispatch(&consumers, &event);
    true
}

fn op_name(event: &ResourceEvent) -> &'static str {
    match event {
        ResourceEvent::Created { .. } => "create",
        ResourceEvent::Updated { .. } => "update",
        ResourceEvent::Deleted { .. } => "delete",
    }
}

fn dispatch(consumers: &[Consumer], event: &ResourceEvent) {
    for consumer in consumers {
        consumer.handler.handle(event, consumer.queue.as_ref());
    }
}

/// Re-establish a dead watch, backing off between attempts.
///
/// Returns the new stream, or `None` when the loop should stop instead.
async fn resync(
    inner: &Weak<Inner>,
    cache_key: &CacheKey,
    capability: &Capability,
    stop: &mut StopSignal,
) -> Option<ObjectEventStream> {
    let mut backoff = fresh_backoff();
    loop {
        let delay = backoff.next().unwrap();
        tokio::select! {
            biased;
            _ = &mut *stop => return None,
            () = tokio::time::sleep(delay) => {}
        }

        match reopen(inner, cache_key, capability).await {
            Ok(Some(stream)) => {
                emit(WatchResumed {
                    kind: &cache_key.kind,
                    key: &cache_key.key,
                });
                return Some(stream);
            }
            Ok(None) => return None,
            Err(error) => emit(WatchResumeFailed {
                kind: &cache_key.kind,
                key: &cache_key.key,
                error: &error,
            }),
        }
    }
}

// 500ms, 1s, 2s, ... capped at one minute.
fn fresh_backoff() -> ExponentialBackoff {
    ExponentialBackoff::from_millis(2)
        .factor(250)
        .max_delay(Duration::from_secs(60))
}

/// One resume attempt: fetch the current state, reopen the watch, then fold
/// whatever changed during the gap into the store as a synthetic event.
///
/// `Ok(None)` means the cache service or the entry is gone.
async fn reopen(
    inner: &Weak<Inner>,
    cache_key: &CacheKey,
    capability: &Capability,
) -> Result<Option<ObjectEventStream>, crate::Error> {
    let fetched = match capability.fetch(&cache_key.key).await {
        Ok(object) => Some(object),
        Err(FetchError::NotFound) => None,
        Err(FetchError::Transient { source }) => return Err(source),
    };
    let stream = match capability.watch(&cache_key.key).await {
        Ok(stream) => stream,
        Err(error) => return Err(error.into()),
    };

    let Some(inner) = inner.upgrade() else {
        return Ok(None);
    };

    match fetched {
        Some(object) => {
            let object: SharedObject = Arc::from(object);
            let notify = {
                let mut store = inner.write();
                let Some(entry) = store.get_mut(cache_key) else {
                    return Ok(None);
                };
                match &entry.object {
                    Some(prior) if prior.eq_erased(object.as_ref()) => None,
                    _ => {
                        let prior = entry.object.replace(Arc::clone(&object));
                        Some((prior, entry.consumers.clone()))
                    }
                }
            };
            if let Some((prior, consumers)) = notify {
                let event = match prior {
                    None => ResourceEvent::Created { object },
                    Some(old) => ResourceEvent::Updated { old, new: object },
                };
                dispatch(&consumers, &event);
            }
        }
        None => {
            let notify = {
                let mut store = inner.write();
                let Some(entry) = store.get_mut(cache_key) else {
                    return Ok(None);
                };
                entry
                    .object
                    .take()
                    .map(|last| (last, entry.consumers.clone()))
            };
            if let Some((last, consumers)) = notify {
                dispatch(&consumers, &ResourceEvent::Deleted { object: last });
            }
        }
    }

    Ok(Some(stream))
}
