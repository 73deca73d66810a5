use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Real-time counters for a [`super::Fetcher`].
///
/// The fetcher updates these as years are processed; callers can snapshot them at any time.
#[derive(Debug)]
pub struct FetchMetrics {
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_writes: AtomicU64,
    downloads: AtomicU64,
    busy_ns: AtomicU64,

    active_fetches: AtomicUsize,
    max_active_fetches: AtomicUsize,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self {
            fetches_started: AtomicU64::new(0),
            fetches_succeeded: AtomicU64::new(0),
            fetches_failed: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_writes: AtomicU64::new(0),
            downloads: AtomicU64::new(0),
            busy_ns: AtomicU64::new(0),
            active_fetches: AtomicUsize::new(0),
            max_active_fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn on_fetch_start(&self) {
        let _ = self.fetches_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_fetches.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_fetches, now);
    }

    pub(crate) fn on_fetch_end(&self, ok: bool, elapsed: Duration) {
        let counter = if ok { &self.fetches_succeeded } else { &self.fetches_failed };
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_fetches.fetch_sub(1, Ordering::SeqCst);
        let add = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.busy_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub(crate) fn on_cache_hit(&self) {
        let _ = self.cache_hits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_cache_write(&self) {
        let _ = self.cache_writes.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_download(&self) {
        let _ = self.downloads.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> FetchMetricsSnapshot {
        FetchMetricsSnapshot {
            fetches_started: self.fetches_started.load(Ordering::SeqCst),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::SeqCst),
            fetches_failed: self.fetches_failed.load(Ordering::SeqCst),
            cache_hits: self.cache_hits.load(Ordering::SeqCst),
            cache_writes: self.cache_writes.load(Ordering::SeqCst),
            downloads: self.downloads.load(Ordering::SeqCst),
            busy: Duration::from_nanos(self.busy_ns.load(Ordering::SeqCst)),
            max_active_fetches: self.max_active_fetches.load(Ordering::SeqCst),
        }
    }
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`FetchMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetricsSnapshot {
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub cache_hits: u64,
    pub cache_writes: u64,
    pub downloads: u64,
    /// Summed wall time of all fetches (exceeds elapsed time when years run in parallel).
    pub busy: Duration,
    pub max_active_fetches: usize,
}

impl fmt::Display for FetchMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetches={}/{} failed={} cache_hits={} cache_writes={} downloads={} max_active={} busy={:?}",
            self.fetches_succeeded,
            self.fetches_started,
            self.fetches_failed,
            self.cache_hits,
            self.cache_writes,
            self.downloads,
            self.max_active_fetches,
            self.busy
        )
    }
}
