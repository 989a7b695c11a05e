//! Tag index and principal generation counters,
//! grounded on the teacher's `enterprise/cache/invalidation.rs`
//! `TagInvalidator` tag-index design, extended with
//! `bump_principal_generation` and simplified from the teacher's
//! dependency-graph cascade invalidation (not needed here — tags already
//! cover the transitive project/team dependency per `spec.md` §3's
//! invariant).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use regex::Regex;

use crate::domain::principal::PrincipalId;

/// Maps each tag to the set of cache keys (rendered as strings) currently
/// carrying it. Mirrors the L2 store's own `SADD`/`SMEMBERS` tag sets so
/// the engine can compute "which L1 entries does this tag cover" without
/// an L2 round trip.
#[derive(Default)]
pub struct TagIndex {
    tag_to_keys: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, tags: &HashSet<String>) {
        for tag in tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    pub fn remove_key(&self, key: &str, tags: &HashSet<String>) {
        for tag in tags {
            if let Some(mut keys) = self.tag_to_keys.get_mut(tag) {
                keys.remove(key);
            }
        }
    }

    /// Every key currently carrying `tag`, removing the tag entry itself
    /// from the index (the caller is expected to evict all of them).
    pub fn take_keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tag_to_keys
            .remove(tag)
            .map(|(_, keys)| keys)
            .unwrap_or_default()
    }

    /// All currently-tracked keys matching a glob pattern (`*` in any
    /// component), per `spec.md` §4.3's pattern invalidation.
    pub fn keys_matching_pattern(&self, pattern: &str) -> HashSet<String> {
        let regex = glob_to_regex(pattern);
        let mut matched = HashSet::new();
        for entry in self.tag_to_keys.iter() {
            for key in entry.value() {
                if regex.is_match(key) {
                    matched.insert(key.clone());
                }
            }
        }
        matched
    }
}

fn glob_to_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    Regex::new(&format!("^{escaped}$")).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

/// Per-principal monotonic generation counters. Bumping a
/// principal's counter logically invalidates every cache entry scoped to
/// them in O(1): the key builder embeds the counter at resolution time, so
/// a stale entry's embedded value simply stops matching on the next
/// lookup.
#[derive(Default)]
pub struct GenerationRegistry {
    counters: DashMap<PrincipalId, AtomicU64>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, principal: PrincipalId) -> u64 {
        self.counters
            .entry(principal)
            .or_insert_with(|| AtomicU64::new(0))
            .load(Ordering::SeqCst)
    }

    /// Returns the new generation value. Incrementing happens before any
    /// caller observes the bump completing, satisfying `spec.md` §5's
    /// ordering guarantee that an invalidation followed by a decision on
    /// the same principal sees the invalidated state.
    pub fn bump(&self, principal: PrincipalId) -> u64 {
        self.counters
            .entry(principal)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn bump_invalidates_previously_resolved_generation() {
        let registry = GenerationRegistry::new();
        let principal = PrincipalId(Uuid::new_v4());
        let resolved_at_write_time = registry.current(principal);
        registry.bump(principal);
        assert_ne!(registry.current(principal), resolved_at_write_time);
    }

    #[test]
    fn tag_index_round_trips_and_clears_on_take() {
        let index = TagIndex::new();
        let tags: HashSet<String> = ["user:1".to_string()].into_iter().collect();
        index.insert("auth:user:1:gen:0:resource:r:op:read", &tags);

        let keys = index.take_keys_for_tag("user:1");
        assert_eq!(keys.len(), 1);
        assert!(index.take_keys_for_tag("user:1").is_empty());
    }

    #[test]
    fn pattern_matching_honors_wildcard_components() {
        let index = TagIndex::new();
        let tags: HashSet<String> = ["resource:r1".to_string()].into_iter().collect();
        index.insert("auth:user:1:gen:0:resource:r1:op:read", &tags);
        index.insert("auth:user:2:gen:0:resource:r1:op:write", &tags);

        let matched = index.keys_matching_pattern("auth:user:*:gen:0:resource:r1:op:*");
        assert_eq!(matched.len(), 2);
    }
}
