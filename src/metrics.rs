//! Minimal metrics scaffolding for the discovery pipeline.
//! Counters only for now; Prometheus exposition can hang off `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};

static FETCHES_ISSUED: AtomicU64 = AtomicU64::new(0);
static FETCHES_APPLIED: AtomicU64 = AtomicU64::new(0);
static FETCHES_STALE_DISCARDED: AtomicU64 = AtomicU64::new(0);
static FETCHES_FAILED: AtomicU64 = AtomicU64::new(0);
static MARKERS_CREATED: AtomicU64 = AtomicU64::new(0);
static MARKERS_DETACHED: AtomicU64 = AtomicU64::new(0);
static MARKERS_RESTYLED: AtomicU64 = AtomicU64::new(0);
static FAVORITE_TOGGLES: AtomicU64 = AtomicU64::new(0);
static FAVORITE_ROLLBACKS: AtomicU64 = AtomicU64::new(0);

pub fn inc_fetch_issued() {
    FETCHES_ISSUED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_fetch_applied() {
    FETCHES_APPLIED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_fetch_stale_discarded() {
    FETCHES_STALE_DISCARDED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_fetch_failed() {
    FETCHES_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_markers_created(n: u64) {
    MARKERS_CREATED.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_markers_detached(n: u64) {
    MARKERS_DETACHED.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_markers_restyled(n: u64) {
    MARKERS_RESTYLED.fetch_add(n, Ordering::Relaxed);
}
pub fn inc_favorite_toggle() {
    FAVORITE_TOGGLES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_favorite_rollback() {
    FAVORITE_ROLLBACKS.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of all counters.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub fetches_issued: u64,
    pub fetches_applied: u64,
    pub fetches_stale_discarded: u64,
    pub fetches_failed: u64,
    pub markers_created: u64,
    pub markers_detached: u64,
    pub markers_restyled: u64,
    pub favorite_toggles: u64,
    pub favorite_rollbacks: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        fetches_issued: FETCHES_ISSUED.load(Ordering::Relaxed),
        fetches_applied: FETCHES_APPLIED.load(Ordering::Relaxed),
        fetches_stale_discarded: FETCHES_STALE_DISCARDED.load(Ordering::Relaxed),
        fetches_failed: FETCHES_FAILED.load(Ordering::Relaxed),
        markers_created: MARKERS_CREATED.load(Ordering::Relaxed),
        markers_detached: MARKERS_DETACHED.load(Ordering::Relaxed),
        markers_restyled: MARKERS_RESTYLED.load(Ordering::Relaxed),
        favorite_toggles: FAVORITE_TOGGLES.load(Ordering::Relaxed),
        favorite_rollbacks: FAVORITE_ROLLBACKS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let before = snapshot();
        inc_fetch_issued();
        inc_fetch_stale_discarded();
        inc_markers_created(3);
        let after = snapshot();
        assert!(after.fetches_issued >= before.fetches_issued + 1);
        assert!(after.fetches_stale_discarded >= before.fetches_stale_discarded + 1);
        assert!(after.markers_created >= before.markers_created + 3);
    }
}
