//! Cache entry shape and canonical tag forms.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::principal::{PrincipalId, TeamId};
use crate::domain::resource::{GenerationId, ProjectId, ResourceId};

/// Canonical tag forms. A closed set of constructors instead
/// of free-form strings, though the underlying representation stored in the
/// tag index is still a `String` — the store only speaks
/// strings.
pub struct Tags;

impl Tags {
    pub fn user(id: PrincipalId) -> String {
        format!("user:{id}")
    }
    pub fn resource(id: ResourceId) -> String {
        format!("resource:{id}")
    }
    pub fn generation(id: GenerationId) -> String {
        format!("generation:{id}")
    }
    pub fn project(id: ProjectId) -> String {
        format!("project:{id}")
    }
    pub fn team(id: TeamId) -> String {
        format!("team:{id}")
    }
}

/// A cache entry as carried internally by the engine. `V` is
/// the decoded application value; L1 stores this directly, L2 stores its
/// encoded form (see `crate::cache::codec`). Timestamps use `DateTime<Utc>`
/// rather than `SystemTime` so the whole entry can cross into L2 through
/// bincode without a custom serializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub owner: PrincipalId,
    pub resource: ResourceId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    pub tags: HashSet<String>,
    pub compressed: bool,
}

impl<V> CacheEntry<V> {
    pub fn new(
        value: V,
        owner: PrincipalId,
        resource: ResourceId,
        ttl: Duration,
        tags: HashSet<String>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        Self {
            value,
            owner,
            resource,
            created_at: now,
            expires_at,
            access_count: 0,
            last_access: now,
            tags,
            compressed: false,
        }
    }

    /// An entry is live iff `now < expires_at`. Tombstoning
    /// by tag invalidation is handled by removal from the backing maps, not
    /// by a flag on the entry itself.
    pub fn is_live(&self) -> bool {
        Utc::now() < self.expires_at
    }

    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_access = Utc::now();
    }

    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
