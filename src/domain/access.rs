//! Access types and the role-permission table of `spec.md` §4.2.1.
//!
//! The teacher's `enterprise/auth/permission.rs` enumerates dozens of
//! CAD-specific `Permission` variants behind a `PermissionSet`; this module
//! keeps that "closed enum + minimum-required-role lookup" shape but
//! collapses it to the five `AccessType` variants the authorization core
//! actually reasons about.

use serde::{Deserialize, Serialize};

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessType {
    Read,
    Write,
    Delete,
    Share,
    Admin,
}

impl AccessType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::Write => "write",
            AccessType::Delete => "delete",
            AccessType::Share => "share",
            AccessType::Admin => "admin",
        }
    }

    /// Minimum role required to exercise this access type on a resource the
    /// principal does not own, per the table in `spec.md` §4.2.1. Owners of
    /// a resource additionally get `delete` at `Editor` instead of `Admin` —
    /// callers pass `is_own_resource` to select the right branch.
    pub fn minimum_required_role(self, is_own_resource: bool) -> Role {
        match self {
            AccessType::Read => Role::Viewer,
            AccessType::Write => Role::Contributor,
            AccessType::Share => Role::Editor,
            AccessType::Delete => {
                if is_own_resource {
                    Role::Editor
                } else {
                    Role::Admin
                }
            }
            AccessType::Admin => Role::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_requires_admin_for_others_resources() {
        assert_eq!(AccessType::Delete.minimum_required_role(false), Role::Admin);
        assert_eq!(AccessType::Delete.minimum_required_role(true), Role::Editor);
    }

    #[test]
    fn read_only_requires_viewer() {
        assert_eq!(AccessType::Read.minimum_required_role(false), Role::Viewer);
    }
}
