//! Layer 5: team/role inheritance reporting.
//!
//! The actual team-membership walk already ran as part of layer 4
//! ([`super::access_control::run`]); this layer only reports on the portion
//! of the shared [`super::AccessTrace`] that pertains to team-derived
//! access, so the chain still surfaces it as its own named step.

use std::time::Instant;

use crate::domain::authorization::{AuthorizationMethod, LayerResult, LayerType};

use super::AccessTrace;

pub fn run(trace: &AccessTrace) -> LayerResult {
    let started = Instant::now();

    if !trace.used_team_path {
        return LayerResult::ok(LayerType::TeamRoleInheritance, started.elapsed());
    }

    let result = LayerResult::ok(LayerType::TeamRoleInheritance, started.elapsed());
    match trace.effective_role {
        Some(role) if trace.method == Some(AuthorizationMethod::TeamMembership) => {
            result.with_metadata("effective_role", role.as_str())
        }
        _ => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;

    #[test]
    fn non_team_path_is_a_no_op() {
        let trace = AccessTrace::default();
        let result = run(&trace);
        assert!(result.success);
        assert!(result.metadata.is_empty());
    }

    #[test]
    fn team_path_reports_effective_role() {
        let mut trace = AccessTrace::default();
        trace.used_team_path = true;
        trace.method = Some(AuthorizationMethod::TeamMembership);
        trace.effective_role = Some(Role::Editor);
        let result = run(&trace);
        assert_eq!(result.metadata.get("effective_role"), Some(&"editor".to_string()));
    }
}
