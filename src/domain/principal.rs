//! Principal identity and team membership.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

/// Stable identifier for an authenticated actor.
///
/// Rendered via [`fmt::Display`] in the canonical 8-4-4-4-12 hex form
/// (`uuid::Uuid`'s own `Display` already produces this), matching the
/// cache-key and audit-record formats in `spec.md` §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub Uuid);

impl PrincipalId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamId(pub Uuid);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A principal's membership in a single team, carrying the role they hold
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: TeamId,
    pub role: Role,
}

/// A principal: a stable id plus the set of teams it belongs to.
///
/// `generation` is the per-principal monotonic counter embedded in cache
/// keys; bumping it via
/// [`crate::cache::invalidation::TagInvalidator::bump_principal_generation`]
/// logically invalidates every cache entry scoped to this principal in
/// O(1), without touching the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub team_memberships: HashMap<TeamId, Role>,
}

impl Principal {
    pub fn new(id: PrincipalId) -> Self {
        Self {
            id,
            team_memberships: HashMap::new(),
        }
    }

    pub fn with_membership(mut self, team_id: TeamId, role: Role) -> Self {
        self.team_memberships.insert(team_id, role);
        self
    }

    /// Role held in the given team, if the principal is a member.
    pub fn role_in_team(&self, team_id: TeamId) -> Option<Role> {
        self.team_memberships.get(&team_id).copied()
    }

    pub fn is_member_of(&self, team_id: TeamId) -> bool {
        self.team_memberships.contains_key(&team_id)
    }
}
