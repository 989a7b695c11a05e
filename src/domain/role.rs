//! Hierarchical team role, grounded on the teacher's `BuiltInRole` hierarchy
//! level system (`enterprise/auth/role.rs`), collapsed from a five-tier CAD
//! role set to the five-tier access role of `spec.md` §3:
//! `viewer(1) < contributor(2) < editor(3) < admin(4) < owner(5)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Viewer,
    Contributor,
    Editor,
    Admin,
    Owner,
}

impl Role {
    /// Hierarchy level, higher is more privileged. `Ord`/`PartialOrd` are
    /// already derived in declaration order, `level` is exposed for callers
    /// that want the numeric form from `spec.md` §3 directly.
    pub fn level(self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::Contributor => 2,
            Role::Editor => 3,
            Role::Admin => 4,
            Role::Owner => 5,
        }
    }

    /// Role `self` satisfies role `required` iff `level(self) >= level(required)`.
    pub fn satisfies(self, required: Role) -> bool {
        self.level() >= required.level()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Contributor => "contributor",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    pub fn min(self, other: Role) -> Role {
        if self.level() <= other.level() {
            self
        } else {
            other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfaction_is_monotonic() {
        assert!(Role::Owner.satisfies(Role::Viewer));
        assert!(Role::Editor.satisfies(Role::Editor));
        assert!(!Role::Viewer.satisfies(Role::Contributor));
    }

    #[test]
    fn min_picks_the_lower_level() {
        assert_eq!(Role::Editor.min(Role::Contributor), Role::Contributor);
        assert_eq!(Role::Owner.min(Role::Admin), Role::Admin);
    }

    #[test]
    fn ordering_matches_declared_hierarchy() {
        let mut roles = vec![Role::Owner, Role::Viewer, Role::Admin, Role::Contributor, Role::Editor];
        roles.sort();
        assert_eq!(
            roles,
            vec![Role::Viewer, Role::Contributor, Role::Editor, Role::Admin, Role::Owner]
        );
    }
}
