//! Rate limiting, grounded on the
//! teacher's `enterprise/ratelimit/algorithm.rs` `Decision` shape, retargeted
//! from token-bucket/GCRA to the fixed-window counters the spec calls for:
//! `window_start = floor(now / window_seconds) * window_seconds`, counters
//! held in the L2 store's sorted-set primitive (`zincrby`) so they are
//! shared across processes, with an in-memory fallback for the fast-lane
//! path.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::config::RateLimit;
use crate::error::CoreResult;
use crate::external::cache_store::SharedCacheStore;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u64 },
    Denied { retry_after_secs: u64, limit: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

fn window_start(now_secs: u64, window_secs: u64) -> u64 {
    if window_secs == 0 {
        return now_secs;
    }
    (now_secs / window_secs) * window_secs
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fixed-window limiter backed by the shared L2 store,
/// keyed by `(scope, identifier, window_start)`.
pub struct FixedWindowLimiter {
    store: Arc<dyn SharedCacheStore>,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<dyn SharedCacheStore>) -> Self {
        Self { store }
    }

    /// Checks and increments the counter for `(scope, identifier)` against
    /// `limit`, scaled by `multiplier`.
    pub async fn check(
        &self,
        scope: &str,
        identifier: &str,
        limit: RateLimit,
        multiplier: f64,
    ) -> CoreResult<Decision> {
        let effective_limit = ((limit.limit as f64) * multiplier).max(1.0) as u64;
        let window_secs = limit.window.as_secs().max(1);
        let now = now_secs();
        let bucket = window_start(now, window_secs);
        let key = format!("rl:{scope}:{identifier}:{bucket}");

        let count = self
            .store
            .zincrby(&key, identifier, 1, Duration::from_secs(window_secs))
            .await?;

        if (count as u64) > effective_limit {
            let retry_after = bucket + window_secs - now;
            Ok(Decision::Denied {
                retry_after_secs: retry_after,
                limit: effective_limit,
            })
        } else {
            Ok(Decision::Allowed {
                remaining: effective_limit.saturating_sub(count as u64),
            })
        }
    }
}

/// Lightweight in-memory fixed-window counter used only by the fast-lane
/// path, avoiding an L2 round trip for health/metrics/auth
/// endpoints.
#[derive(Default)]
pub struct InMemoryWindowLimiter {
    buckets: DashMap<String, (AtomicU64, AtomicI64)>,
}

impl InMemoryWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, scope: &str, identifier: &str, limit: RateLimit) -> Decision {
        let window_secs = limit.window.as_secs().max(1);
        let now = now_secs();
        let bucket = window_start(now, window_secs);
        let key = format!("{scope}:{identifier}");

        let entry = self
            .buckets
            .entry(key)
            .or_insert_with(|| (AtomicU64::new(0), AtomicI64::new(bucket as i64)));

        let (count, stored_bucket) = &*entry;
        if stored_bucket.swap(bucket as i64, Ordering::SeqCst) != bucket as i64 {
            count.store(0, Ordering::SeqCst);
        }
        let current = count.fetch_add(1, Ordering::SeqCst) + 1;

        if current > limit.limit {
            Decision::Denied {
                retry_after_secs: bucket + window_secs - now,
                limit: limit.limit,
            }
        } else {
            Decision::Allowed {
                remaining: limit.limit.saturating_sub(current),
            }
        }
    }
}

/// Scales a rate limit downward as the aggregated threat level rises
///. `risk_score` is read from the caller's
/// security context rather than a same-request threat level, since layer 2
/// runs before the context-validation layer (layer 3) computes one.
pub fn threat_multiplier(risk_score: f64) -> f64 {
    if risk_score >= 0.8 {
        0.25
    } else if risk_score >= 0.5 {
        0.5
    } else if risk_score >= 0.2 {
        0.75
    } else {
        1.0
    }
}
