//! Shared cache store (L2) primitives: `GET/SET` with TTL,
//! `DEL`, set-membership for the tag index, stream append for audit, and a
//! sorted-set-by-timestamp for rate-window counting. Keys are strings,
//! values opaque bytes. `InMemorySharedStore` is the reference
//! implementation used by tests and the demo binary; a `redis`-backed one
//! lives behind the `redis-store` feature, matching the teacher's own
//! optional-Redis posture in its rate-limit module.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::CoreResult;

#[async_trait]
pub trait SharedCacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CoreResult<()>;
    async fn del(&self, key: &str) -> CoreResult<()>;

    async fn sadd(&self, set_key: &str, member: &str) -> CoreResult<()>;
    async fn smembers(&self, set_key: &str) -> CoreResult<HashSet<String>>;
    async fn srem(&self, set_key: &str, member: &str) -> CoreResult<()>;

    /// Appends one entry to a capped stream, used by the audit pipeline's
    /// short-retention real-time stream.
    async fn stream_append(&self, stream_key: &str, value: Vec<u8>, cap: usize) -> CoreResult<()>;
    async fn stream_recent(&self, stream_key: &str, count: usize) -> CoreResult<Vec<Vec<u8>>>;

    /// Increments the counter for `member` in a sorted set keyed by
    /// timestamp bucket, used by the fixed-window rate limiter
    ///.
    async fn zincrby(&self, zset_key: &str, member: &str, delta: i64, ttl: Duration) -> CoreResult<i64>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// `DashMap`-backed reference implementation, matching the teacher's
/// in-memory stand-ins elsewhere (`enterprise::cache::strategy::InMemoryStore`).
#[derive(Default)]
pub struct InMemorySharedStore {
    kv: DashMap<String, Entry>,
    sets: DashMap<String, HashSet<String>>,
    streams: DashMap<String, Mutex<Vec<Vec<u8>>>>,
    zsets: DashMap<String, Mutex<HashMap<String, (i64, Instant)>>>,
}

impl InMemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCacheStore for InMemorySharedStore {
    async fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        match self.kv.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CoreResult<()> {
        self.kv.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> CoreResult<()> {
        self.kv.remove(key);
        Ok(())
    }

    async fn sadd(&self, set_key: &str, member: &str) -> CoreResult<()> {
        self.sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn smembers(&self, set_key: &str) -> CoreResult<HashSet<String>> {
        Ok(self
            .sets
            .get(set_key)
            .map(|s| s.clone())
            .unwrap_or_default())
    }

    async fn srem(&self, set_key: &str, member: &str) -> CoreResult<()> {
        if let Some(mut set) = self.sets.get_mut(set_key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn stream_append(&self, stream_key: &str, value: Vec<u8>, cap: usize) -> CoreResult<()> {
        let stream = self.streams.entry(stream_key.to_string()).or_default();
        let mut guard = stream.lock();
        guard.push(value);
        let len = guard.len();
        if len > cap {
            guard.drain(0..len - cap);
        }
        Ok(())
    }

    async fn stream_recent(&self, stream_key: &str, count: usize) -> CoreResult<Vec<Vec<u8>>> {
        Ok(self
            .streams
            .get(stream_key)
            .map(|s| {
                let guard = s.lock();
                let len = guard.len();
                guard[len.saturating_sub(count)..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn zincrby(
        &self,
        zset_key: &str,
        member: &str,
        delta: i64,
        ttl: Duration,
    ) -> CoreResult<i64> {
        let zset = self.zsets.entry(zset_key.to_string()).or_default();
        let mut guard = zset.lock();
        let now = Instant::now();
        guard.retain(|_, (_, expires)| *expires > now);
        let entry = guard
            .entry(member.to_string())
            .or_insert((0, now + ttl));
        entry.0 += delta;
        entry.1 = now + ttl;
        Ok(entry.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemorySharedStore::new();
        store.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let store = InMemorySharedStore::new();
        store
            .set("k", b"v".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn del_removes_the_key() {
        let store = InMemorySharedStore::new();
        store.set("k", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn tag_set_membership() {
        let store = InMemorySharedStore::new();
        store.sadd("tag:user:1", "key-a").await.unwrap();
        store.sadd("tag:user:1", "key-b").await.unwrap();
        let members = store.smembers("tag:user:1").await.unwrap();
        assert_eq!(members.len(), 2);
        store.srem("tag:user:1", "key-a").await.unwrap();
        assert_eq!(store.smembers("tag:user:1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stream_append_caps_length() {
        let store = InMemorySharedStore::new();
        for i in 0..10u8 {
            store.stream_append("events", vec![i], 5).await.unwrap();
        }
        let recent = store.stream_recent("events", 100).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0], vec![5]);
    }

    #[tokio::test]
    async fn zincrby_accumulates_within_window() {
        let store = InMemorySharedStore::new();
        let a = store
            .zincrby("rl:user:1", "count", 1, Duration::from_secs(60))
            .await
            .unwrap();
        let b = store
            .zincrby("rl:user:1", "count", 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }
}
