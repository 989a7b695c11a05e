//! Cache hit-rate and latency accounting, grounded on
//! the teacher's `enterprise/cache/tier.rs` tier-level counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Which tier served (or failed to serve) a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHit {
    Hot,
    L1,
    L2,
    Miss,
}

#[derive(Default)]
pub struct CacheMetrics {
    hot_hits: AtomicU64,
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    response_time_total_ms: AtomicU64,
    response_time_samples: AtomicU64,
    l2_degraded: AtomicBool,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tier: TierHit, elapsed: Duration) {
        match tier {
            TierHit::Hot => self.hot_hits.fetch_add(1, Ordering::Relaxed),
            TierHit::L1 => self.l1_hits.fetch_add(1, Ordering::Relaxed),
            TierHit::L2 => self.l2_hits.fetch_add(1, Ordering::Relaxed),
            TierHit::Miss => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        self.response_time_total_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.response_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn total_lookups(&self) -> u64 {
        self.hot_hits.load(Ordering::Relaxed)
            + self.l1_hits.load(Ordering::Relaxed)
            + self.l2_hits.load(Ordering::Relaxed)
            + self.misses.load(Ordering::Relaxed)
    }

    /// Overall hit rate across both tiers.
    pub fn overall_hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 1.0;
        }
        let hits = self.hot_hits.load(Ordering::Relaxed)
            + self.l1_hits.load(Ordering::Relaxed)
            + self.l2_hits.load(Ordering::Relaxed);
        hits as f64 / total as f64
    }

    /// L1-only hit rate (hot-keys count as L1 for this ratio, `spec.md`
    /// §7's 97% target).
    pub fn l1_hit_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            return 1.0;
        }
        let l1_hits = self.hot_hits.load(Ordering::Relaxed) + self.l1_hits.load(Ordering::Relaxed);
        l1_hits as f64 / total as f64
    }

    pub fn average_response_time_ms(&self) -> f64 {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        self.response_time_total_ms.load(Ordering::Relaxed) as f64 / samples as f64
    }

    /// Marks the L2 tier as having failed at least once. Sticky for the
    /// lifetime of the engine: `spec.md` §7's degraded mode is a standing
    /// condition the orchestrator keeps reporting to audit, not a
    /// per-call blip.
    pub fn mark_l2_degraded(&self) {
        self.l2_degraded.store(true, Ordering::Relaxed);
    }

    pub fn is_l2_degraded(&self) -> bool {
        self.l2_degraded.load(Ordering::Relaxed)
    }
}
