//! Single immutable configuration value, built once at startup from the
//! knobs enumerated in `spec.md` §6 and passed by `Arc<CoreConfig>` to every
//! component's constructor.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-endpoint-category rate limit: `limit` requests per `window`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(limit: u64, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Rate limit scopes named in `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub global: RateLimit,
    pub auth: RateLimit,
    pub sensitive: RateLimit,
    pub upload: RateLimit,
    pub generation: RateLimit,
    /// Default per-principal limiter used by layer 2 when no more specific
    /// category applies.
    pub per_principal: RateLimit,
    /// Default per-IP limiter used by layer 2.
    pub per_ip: RateLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: RateLimit::new(1000, 3600),
            auth: RateLimit::new(10, 900),
            sensitive: RateLimit::new(50, 3600),
            upload: RateLimit::new(20, 3600),
            generation: RateLimit::new(100, 3600),
            per_principal: RateLimit::new(100, 60),
            per_ip: RateLimit::new(500, 60),
        }
    }
}

/// Volatility category selecting default TTLs for a cache key pattern
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Volatility {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

/// `(L1_ttl, L2_ttl)` defaults plus floor/ceiling for a volatility category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TtlDefaults {
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
    pub min_ttl: Duration,
    pub max_ttl: Duration,
}

fn ttl_defaults_table() -> HashMap<Volatility, TtlDefaults> {
    use Volatility::*;
    let mut table = HashMap::new();
    table.insert(
        VeryHigh,
        TtlDefaults {
            l1_ttl: Duration::from_secs(15),
            l2_ttl: Duration::from_secs(30),
            min_ttl: Duration::from_secs(5),
            max_ttl: Duration::from_secs(120),
        },
    );
    table.insert(
        High,
        TtlDefaults {
            l1_ttl: Duration::from_secs(60),
            l2_ttl: Duration::from_secs(180),
            min_ttl: Duration::from_secs(15),
            max_ttl: Duration::from_secs(600),
        },
    );
    table.insert(
        Medium,
        TtlDefaults {
            l1_ttl: Duration::from_secs(300),
            l2_ttl: Duration::from_secs(900),
            min_ttl: Duration::from_secs(60),
            max_ttl: Duration::from_secs(3600),
        },
    );
    table.insert(
        Low,
        TtlDefaults {
            l1_ttl: Duration::from_secs(900),
            l2_ttl: Duration::from_secs(3600),
            min_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(21_600),
        },
    );
    table.insert(
        VeryLow,
        TtlDefaults {
            l1_ttl: Duration::from_secs(3600),
            l2_ttl: Duration::from_secs(21_600),
            min_ttl: Duration::from_secs(900),
            max_ttl: Duration::from_secs(86_400),
        },
    );
    table
}

/// Input validation bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidationLimits {
    pub max_json_depth: u32,
    pub max_array_length: usize,
    pub max_string_length: usize,
    pub max_body_bytes: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_json_depth: 10,
            max_array_length: 1000,
            max_string_length: 10_000,
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Cache subsystem performance/capacity knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    pub l1_memory_budget_mib: usize,
    pub overall_hit_rate_target: f64,
    pub l1_hit_rate_target: f64,
    pub l2_hit_rate_target: f64,
    pub l1_response_target_ms: u64,
    pub l2_response_target_ms: u64,
    /// Hot-keys sub-structure bound.
    pub hot_keys_capacity: usize,
    /// Compress entries whose encoded size exceeds this threshold, bytes.
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_memory_budget_mib: 300,
            overall_hit_rate_target: 0.95,
            l1_hit_rate_target: 0.97,
            l2_hit_rate_target: 0.90,
            l1_response_target_ms: 5,
            l2_response_target_ms: 20,
            hot_keys_capacity: 1000,
            compression_threshold_bytes: 2048,
        }
    }
}

/// Top-level, immutable configuration for the authorization and cache core.
///
/// Built once at process start (`CoreConfig::from_env` or
/// `CoreConfig::default`) and shared by `Arc` — no component mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub rate_limits: RateLimitConfig,
    pub validation: ValidationLimits,
    pub cache: CacheConfig,
    pub inheritance_max_depth: u32,
    pub auth_response_target_ms: u64,
    /// Adaptive TTL manager's combined-factor clamp, `1 ± sensitivity`
    ///.
    pub ttl_sensitivity: f64,
    pub siem_batch_size: usize,
    pub audit_retention_days: u32,
    pub fast_lane_prefixes: Vec<String>,
    /// Default media grant lifetime.
    pub media_grant_default_ttl: Duration,
    /// Chain-wide deadline for a single authorization request.
    pub chain_deadline: Duration,
    /// Soft per-layer budget, advisory only.
    pub layer_soft_budget: Duration,
    /// Hard per-layer timeout.
    pub layer_hard_timeout: Duration,
}

impl CoreConfig {
    pub fn ttl_defaults(&self, volatility: Volatility) -> TtlDefaults {
        ttl_defaults_table()[&volatility]
    }

    /// Build from environment variables, falling back to the enumerated
    /// defaults, in the style of the teacher's `SaasConfig::from_env`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("L1_MEMORY_BUDGET_MIB") {
            if let Ok(v) = v.parse() {
                config.cache.l1_memory_budget_mib = v;
            }
        }
        if let Ok(v) = std::env::var("AUDIT_RETENTION_DAYS") {
            if let Ok(v) = v.parse() {
                config.audit_retention_days = v;
            }
        }
        if let Ok(v) = std::env::var("FAST_LANE_PREFIXES") {
            config.fast_lane_prefixes = v.split(',').map(str::to_string).collect();
        }
        config
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitConfig::default(),
            validation: ValidationLimits::default(),
            cache: CacheConfig::default(),
            inheritance_max_depth: 10,
            auth_response_target_ms: 75,
            ttl_sensitivity: 0.1,
            siem_batch_size: 100,
            audit_retention_days: 90,
            fast_lane_prefixes: vec![
                "/api/auth".into(),
                "/health".into(),
                "/metrics".into(),
                "/e2e".into(),
            ],
            media_grant_default_ttl: Duration::from_secs(3600),
            chain_deadline: Duration::from_secs(2),
            layer_soft_budget: Duration::from_millis(10),
            layer_hard_timeout: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_knobs() {
        let config = CoreConfig::default();
        assert_eq!(config.rate_limits.auth.limit, 10);
        assert_eq!(config.validation.max_body_bytes, 50 * 1024 * 1024);
        assert_eq!(config.inheritance_max_depth, 10);
    }

    #[test]
    fn ttl_defaults_are_ordered_by_volatility() {
        let config = CoreConfig::default();
        let hi = config.ttl_defaults(Volatility::VeryHigh);
        let lo = config.ttl_defaults(Volatility::VeryLow);
        assert!(hi.l1_ttl < lo.l1_ttl);
        assert!(hi.max_ttl < lo.max_ttl);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("L1_MEMORY_BUDGET_MIB");
        let config = CoreConfig::from_env();
        assert_eq!(config.cache.l1_memory_budget_mib, 300);
    }
}
