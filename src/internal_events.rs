//! Internal observability events.
//!
//! Each event logs and bumps its counters in exactly one place, so call
//! sites stay free of instrumentation details.

use metrics::counter;

use crate::narrowcache::{ObjectKey, ResourceKind};

/// An event worth logging and counting.
pub(crate) trait InternalEvent {
    /// Log and update metrics.
    fn emit(self);
}

/// Emit one event.
pub(crate) fn emit(event: impl InternalEvent) {
    event.emit();
}

#[derive(Debug)]
pub(crate) struct CacheMissLiveLookup<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
}

impl InternalEvent for CacheMissLiveLookup<'_> {
    fn emit(self) {
        debug!(message = "Cache miss, querying the live API.", kind = %self.kind, key = %self.key);
        counter!("narrow_cache_misses_total", "kind" => self.kind.to_string()).increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct WatchEventApplied<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
    pub op: &'static str,
}

impl InternalEvent for WatchEventApplied<'_> {
    fn emit(self) {
        trace!(message = "Watch event applied.", kind = %self.kind, key = %self.key, op = self.op);
        counter!("narrow_cache_events_total", "op" => self.op).increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct WatchInterrupted<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
}

impl InternalEvent for WatchInterrupted<'_> {
    fn emit(self) {
        warn!(message = "Watch stream ended, scheduling re-watch.", kind = %self.kind, key = %self.key);
        counter!("narrow_cache_watch_interruptions_total").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct WatchResumed<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
}

impl InternalEvent for WatchResumed<'_> {
    fn emit(self) {
        info!(message = "Watch re-established.", kind = %self.kind, key = %self.key);
        counter!("narrow_cache_watch_resumes_total").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct WatchResumeFailed<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
    pub error: &'a crate::Error,
}

impl InternalEvent for WatchResumeFailed<'_> {
    fn emit(self) {
        warn!(
            message = "Failed to re-establish watch, backing off.",
            kind = %self.kind,
            key = %self.key,
            error = %self.error,
        );
        counter!("narrow_cache_watch_resume_failures_total").increment(1);
    }
}

#[derive(Debug)]
pub(crate) struct EntryInvalidated<'a> {
    pub kind: &'a ResourceKind,
    pub key: &'a ObjectKey,
}

impl InternalEvent for EntryInvalidated<'_> {
    fn emit(self) {
        info!(message = "Cache entry invalidated.", kind = %self.kind, key = %self.key);
        counter!("narrow_cache_invalidations_total", "kind" => self.kind.to_string()).increment(1);
    }
}
