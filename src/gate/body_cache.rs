//! Single-read request body cache. Solves the
//! "re-entrant body reads across multiple inspectors" pattern flagged in
//! `spec.md` §9: the Gate reads the body at most once and stores an
//! immutable result that every downstream layer shares, instead of each
//! inspector reaching back into the transport.

use std::sync::Arc;

/// The outcome of the Gate's single body read for one request.
#[derive(Debug, Clone, Default)]
pub enum CachedBody {
    /// No body was present, or the request's method doesn't carry one.
    #[default]
    Empty,
    /// The body was read and cached in full.
    Bytes(Arc<[u8]>),
    /// The body exceeded `max_body_bytes`; the Gate continues without
    /// body inspection rather than aborting the request.
    Failed,
}

impl CachedBody {
    pub fn body_cache_failed(&self) -> bool {
        matches!(self, CachedBody::Failed)
    }

    /// The cached bytes, or an empty slice for `Empty`/`Failed` — downstream
    /// code must never fall back to re-reading the transport.
    pub fn bytes(&self) -> &[u8] {
        match self {
            CachedBody::Bytes(b) => b,
            CachedBody::Empty | CachedBody::Failed => &[],
        }
    }

    pub fn decoded_json(&self) -> Option<serde_json::Value> {
        match self {
            CachedBody::Bytes(b) => serde_json::from_slice(b).ok(),
            CachedBody::Empty | CachedBody::Failed => None,
        }
    }
}

/// Caches a request body exactly once, enforcing `max_body_bytes`
///.
pub struct BodyCache {
    max_bytes: usize,
}

impl BodyCache {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn cache(&self, body: Vec<u8>) -> CachedBody {
        if body.is_empty() {
            return CachedBody::Empty;
        }
        if body.len() > self.max_bytes {
            return CachedBody::Failed;
        }
        CachedBody::Bytes(Arc::from(body.into_boxed_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_within_limit_is_cached() {
        let cache = BodyCache::new(10);
        let cached = cache.cache(vec![1, 2, 3]);
        assert!(!cached.body_cache_failed());
        assert_eq!(cached.bytes(), &[1, 2, 3]);
    }

    #[test]
    fn body_exactly_at_limit_succeeds() {
        let cache = BodyCache::new(3);
        let cached = cache.cache(vec![1, 2, 3]);
        assert!(!cached.body_cache_failed());
    }

    #[test]
    fn body_over_limit_fails_without_aborting() {
        let cache = BodyCache::new(3);
        let cached = cache.cache(vec![1, 2, 3, 4]);
        assert!(cached.body_cache_failed());
        assert_eq!(cached.bytes(), &[] as &[u8]);
    }

    #[test]
    fn empty_body_is_empty_not_failed() {
        let cache = BodyCache::new(10);
        let cached = cache.cache(Vec::new());
        assert!(!cached.body_cache_failed());
        assert!(matches!(cached, CachedBody::Empty));
    }
}
