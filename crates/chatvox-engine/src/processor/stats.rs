//! Shared activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chatvox_core::ProcessorStats;

/// Lock-free counters shared by the service (admission) and the processor
/// (queueing, synthesis, playback).
#[derive(Debug, Default)]
pub struct StatsCounters {
    received: AtomicU64,
    admitted: AtomicU64,
    denied: AtomicU64,
    rate_limited: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// A counter in [`StatsCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Received,
    Admitted,
    Denied,
    RateLimited,
    Dropped,
    Completed,
    Failed,
    Skipped,
    CacheHit,
    CacheMiss,
}

impl StatsCounters {
    const fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Received => &self.received,
            Counter::Admitted => &self.admitted,
            Counter::Denied => &self.denied,
            Counter::RateLimited => &self.rate_limited,
            Counter::Dropped => &self.dropped,
            Counter::Completed => &self.completed,
            Counter::Failed => &self.failed,
            Counter::Skipped => &self.skipped,
            Counter::CacheHit => &self.cache_hits,
            Counter::CacheMiss => &self.cache_misses,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counter(counter).fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProcessorStats {
        let get = |counter| self.counter(counter).load(Ordering::Relaxed);
        ProcessorStats {
            received: get(Counter::Received),
            admitted: get(Counter::Admitted),
            denied: get(Counter::Denied),
            rate_limited: get(Counter::RateLimited),
            dropped: get(Counter::Dropped),
            completed: get(Counter::Completed),
            failed: get(Counter::Failed),
            skipped: get(Counter::Skipped),
            cache_hits: get(Counter::CacheHit),
            cache_misses: get(Counter::CacheMiss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_snapshot() {
        let stats = StatsCounters::default();
        stats.incr(Counter::Received);
        stats.incr(Counter::Received);
        stats.add(Counter::Dropped, 3);
        let snap = stats.snapshot();
        assert_eq!(snap.received, 2);
        assert_eq!(snap.dropped, 3);
        assert_eq!(snap.completed, 0);
    }
}
