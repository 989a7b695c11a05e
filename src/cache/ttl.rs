//! Adaptive TTL Manager, grounded on the teacher's
//! `enterprise/ratelimit/analytics.rs` rolling-window counters, repurposed
//! here to track per-key-pattern hit rate, response time, and access
//! frequency instead of request volume.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{CoreConfig, TtlDefaults, Volatility};

/// Bounded rolling window of access instants, used to derive the
/// accesses-per-minute rate the frequency factor is driven by (`spec.md`
/// §4.4: "rolling list of access times (bounded window of 100)").
const ACCESS_WINDOW: usize = 100;

/// Accumulated observations for one key pattern (identified by its
/// `KeyKind`, since that is the granularity `spec.md` §4.4 adapts at).
#[derive(Default)]
struct PatternStats {
    hits: AtomicU64,
    misses: AtomicU64,
    response_time_total_ms: AtomicU64,
    response_time_samples: AtomicU64,
    access_times: Mutex<VecDeque<Instant>>,
}

impl PatternStats {
    fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            return 0.0;
        }
        hits / (hits + misses)
    }

    fn avg_response_time_ms(&self) -> f64 {
        let samples = self.response_time_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        self.response_time_total_ms.load(Ordering::Relaxed) as f64 / samples as f64
    }

    fn record_access(&self, now: Instant) {
        let mut times = self.access_times.lock();
        times.push_back(now);
        if times.len() > ACCESS_WINDOW {
            times.pop_front();
        }
    }

    /// Accesses-per-minute over the retained window, `0.0` with fewer than
    /// two samples (no interval to measure yet).
    fn accesses_per_minute(&self, now: Instant) -> f64 {
        let times = self.access_times.lock();
        if times.len() < 2 {
            return 0.0;
        }
        let span = now.saturating_duration_since(*times.front().unwrap()).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (times.len() as f64 - 1.0) / span * 60.0
    }
}

/// The two adjustment factors of `spec.md` §4.4 and their combination.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AdjustmentFactors {
    frequency: f64,
    performance: f64,
    combined: f64,
}

/// Baseline accesses-per-minute against which the frequency factor is
/// normalized. Not spec-mandated (the spec gives the factor's range, not
/// its exact curve); chosen so a pattern accessed roughly once every six
/// seconds sits at the factor's midpoint.
const FREQUENCY_BASELINE_PER_MIN: f64 = 10.0;

fn compute_factors(accesses_per_minute: f64, hit_rate: f64, target_hit_rate: f64, sensitivity: f64) -> AdjustmentFactors {
    let frequency = (0.8 + (accesses_per_minute / FREQUENCY_BASELINE_PER_MIN) * 0.5).clamp(0.8, 1.3);
    let performance = if target_hit_rate > 0.0 {
        (hit_rate / target_hit_rate).clamp(0.8, 1.2)
    } else {
        1.0
    };
    let raw_combined = (frequency + performance) / 2.0;
    let combined = raw_combined.clamp(1.0 - sensitivity, 1.0 + sensitivity);
    AdjustmentFactors {
        frequency,
        performance,
        combined,
    }
}

/// Tracks hit-rate, latency, and access frequency per pattern and
/// re-derives the effective TTL for that pattern on the promotion cadence
/// of `spec.md` §4.4. The promotion rule only replaces the stored TTL when
/// all three of its conditions hold: combined-factor movement of at least
/// 5%, observed hit rate at least 0.9x the target, and at least an hour
/// since the pattern's last adjustment.
pub struct TtlManager {
    defaults: fn(&CoreConfig, Volatility) -> TtlDefaults,
    stats: DashMap<&'static str, PatternStats>,
    effective: DashMap<&'static str, Mutex<(Duration, Instant)>>,
    promotion_interval: Duration,
    target_hit_rate: f64,
    #[allow(dead_code)]
    target_response_ms: u64,
}

impl TtlManager {
    pub fn new(target_hit_rate: f64, target_response_ms: u64) -> Self {
        Self {
            defaults: |config, v| config.ttl_defaults(v),
            stats: DashMap::new(),
            effective: DashMap::new(),
            promotion_interval: Duration::from_secs(3600),
            target_hit_rate,
            target_response_ms,
        }
    }

    pub fn record(&self, pattern: &'static str, hit: bool, response_time: Duration) {
        let entry = self.stats.entry(pattern).or_default();
        if hit {
            entry.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
            .response_time_total_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);
        entry.response_time_samples.fetch_add(1, Ordering::Relaxed);
        entry.record_access(Instant::now());
    }

    /// Current L1 TTL to use for `pattern`, starting from `volatility`'s
    /// default and promoted by accumulated stats per the rule above.
    pub fn resolve_ttl(&self, config: &CoreConfig, pattern: &'static str, volatility: Volatility) -> Duration {
        let bounds = (self.defaults)(config, volatility);
        let slot = self
            .effective
            .entry(pattern)
            .or_insert_with(|| Mutex::new((bounds.l1_ttl, Instant::now())));
        let mut guard = slot.lock();
        let (current, last_adjusted) = *guard;

        if last_adjusted.elapsed() < self.promotion_interval {
            return current;
        }

        let Some(stats) = self.stats.get(pattern) else {
            return current;
        };

        let hit_rate = stats.hit_rate();
        let rate = stats.accesses_per_minute(Instant::now());
        let factors = compute_factors(rate, hit_rate, self.target_hit_rate, config.ttl_sensitivity);

        let movement = (factors.combined - 1.0).abs();
        let promote = movement >= 0.05 && hit_rate >= 0.9 * self.target_hit_rate;

        if !promote {
            *guard = (current, Instant::now());
            return current;
        }

        let adjusted = current.mul_f64(factors.combined);
        let next = adjusted.clamp(bounds.min_ttl, bounds.max_ttl);
        *guard = (next, Instant::now());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_volatility_baseline_before_any_samples() {
        let manager = TtlManager::new(0.95, 5);
        let config = CoreConfig::default();
        let ttl = manager.resolve_ttl(&config, "generation", Volatility::High);
        assert_eq!(ttl, config.ttl_defaults(Volatility::High).l1_ttl);
    }

    #[test]
    fn does_not_adjust_before_the_promotion_interval_elapses() {
        let manager = TtlManager::new(0.5, 100);
        let config = CoreConfig::default();
        for _ in 0..100 {
            manager.record("resource", true, Duration::from_millis(1));
        }
        let first = manager.resolve_ttl(&config, "resource", Volatility::Medium);
        let second = manager.resolve_ttl(&config, "resource", Volatility::Medium);
        assert_eq!(first, second);
    }

    #[test]
    fn performance_factor_is_clamped_to_spec_bounds() {
        // hit_rate far below target clamps to 0.8, far above clamps to 1.2.
        let low = compute_factors(0.0, 0.0, 0.95, 0.1);
        assert!((low.performance - 0.8).abs() < 1e-9);

        let high = compute_factors(0.0, 1.0, 0.2, 0.1);
        assert!((high.performance - 1.2).abs() < 1e-9);
    }

    #[test]
    fn frequency_factor_is_clamped_to_spec_bounds() {
        let idle = compute_factors(0.0, 1.0, 1.0, 0.1);
        assert!((idle.frequency - 0.8).abs() < 1e-9);

        let busy = compute_factors(1000.0, 1.0, 1.0, 0.1);
        assert!((busy.frequency - 1.3).abs() < 1e-9);
    }

    #[test]
    fn combined_factor_is_clamped_to_one_plus_minus_sensitivity() {
        let factors = compute_factors(1000.0, 1.0, 0.2, 0.1);
        assert!(factors.combined <= 1.1 + 1e-9);
        assert!(factors.combined >= 0.9 - 1e-9);
    }

    #[test]
    fn promotion_requires_hit_rate_at_least_ninety_percent_of_target() {
        let manager = TtlManager::new(0.95, 100);
        let config = CoreConfig::default();
        // Only misses recorded: hit_rate = 0.0, far below 0.9 * 0.95.
        for _ in 0..20 {
            manager.record("cold_pattern", false, Duration::from_millis(5));
        }
        // Force the promotion window open by back-dating the slot.
        manager.resolve_ttl(&config, "cold_pattern", Volatility::Medium);
        if let Some(slot) = manager.effective.get("cold_pattern") {
            let mut guard = slot.lock();
            guard.1 = Instant::now() - Duration::from_secs(3601);
        }
        let baseline = config.ttl_defaults(Volatility::Medium).l1_ttl;
        let ttl = manager.resolve_ttl(&config, "cold_pattern", Volatility::Medium);
        assert_eq!(ttl, baseline, "a pattern missing almost every access must not be promoted");
    }
}
