//! Layer 4: access control resolution, the core of the
//! authorization engine. Walks ownership, project ownership, team
//! membership, and project visibility at the requested resource, climbing
//! the generation parent chain when nothing at the current level grants
//! enough role — bounded by `inheritance_max_depth` and guarded against
//! cycles by a visited set.
//!
//! Required layer: any error here denies the request.

use std::collections::HashSet;
use std::time::Instant;

use crate::config::CoreConfig;
use crate::domain::access::AccessType;
use crate::domain::authorization::{AuthorizationMethod, AuthorizationRequest, LayerResult, LayerType};
use crate::domain::principal::{PrincipalId, TeamId};
use crate::domain::resource::{GenerationId, ProjectId, ResourceId};
use crate::domain::role::Role;
use crate::domain::visibility::ProjectVisibility;
use crate::error::{CoreError, DenialReason};
use crate::external::store::PersistentStore;

use super::AccessTrace;

/// A resource-shaped node as the parent-chain walk sees it: either the
/// request's own resource or a fetched parent generation row.
struct ResolutionNode {
    id: ResourceId,
    owner: PrincipalId,
    project_id: Option<ProjectId>,
    parent_generation_id: Option<GenerationId>,
}

/// Runs layer 4 and returns both the [`LayerResult`] and the [`AccessTrace`]
/// the two downstream reporting layers (team inheritance, inheritance depth
/// guard) read instead of re-running the resolution.
pub async fn run(
    request: &AuthorizationRequest,
    config: &CoreConfig,
    store: &dyn PersistentStore,
) -> (LayerResult, AccessTrace) {
    let started = Instant::now();
    let correlation_id = uuid::Uuid::new_v4();

    match resolve(request, config, store).await {
        Ok(trace) => {
            if trace.granted {
                (LayerResult::ok(LayerType::AccessControl, started.elapsed()), trace)
            } else {
                let reason = trace.denial_reason.unwrap_or(DenialReason::NotOwner);
                (
                    LayerResult::failed(
                        LayerType::AccessControl,
                        started.elapsed(),
                        CoreError::Unauthorized {
                            reason,
                            correlation_id,
                        },
                    ),
                    trace,
                )
            }
        }
        Err(err) => (
            LayerResult::failed(LayerType::AccessControl, started.elapsed(), err),
            AccessTrace::default(),
        ),
    }
}

async fn resolve(
    request: &AuthorizationRequest,
    config: &CoreConfig,
    store: &dyn PersistentStore,
) -> Result<AccessTrace, CoreError> {
    let principal = request.principal;
    let required_role = request.access.minimum_required_role(request.resource.owned_by(principal));
    let principal_teams = store.fetch_team_memberships(principal).await?;

    let mut node = ResolutionNode {
        id: request.resource.id,
        owner: request.resource.owner,
        project_id: request.resource.project_id,
        parent_generation_id: request.resource.parent_generation_id,
    };
    let mut visited: HashSet<ResourceId> = HashSet::new();
    let mut depth: u32 = 0;
    let mut best: Option<(Role, AuthorizationMethod)> = None;
    let mut saw_private_project = false;
    let mut used_team_path = false;

    loop {
        if let Some((role, method)) =
            node_role(principal, &node, request.access, required_role, &principal_teams, store).await?
        {
            if matches!(method, AuthorizationMethod::TeamMembership) {
                used_team_path = true;
            }
            let improves = best.map(|(r, _)| role > r).unwrap_or(true);
            if improves {
                best = Some((role, method));
            }
            if role.satisfies(required_role) {
                return Ok(AccessTrace {
                    granted: true,
                    method: Some(method),
                    effective_role: Some(role),
                    depth_used: depth,
                    cycle_detected: false,
                    denial_reason: None,
                    used_team_path,
                });
            }
        } else if let Some(project_id) = node.project_id {
            if let Some(project) = store.fetch_project(project_id).await? {
                if project.visibility == ProjectVisibility::Private {
                    saw_private_project = true;
                }
            }
        }

        let Some(parent) = node.parent_generation_id else {
            break;
        };
        let parent_resource_id = ResourceId(parent.0);
        if visited.contains(&parent_resource_id) {
            return Ok(exhausted(best, saw_private_project, depth, true, used_team_path));
        }
        if depth >= config.inheritance_max_depth {
            return Ok(exhausted(best, saw_private_project, depth, false, used_team_path));
        }

        visited.insert(node.id);
        let Some(parent_record) = store.fetch_resource(parent_resource_id).await? else {
            break;
        };
        depth += 1;
        node = ResolutionNode {
            id: parent_record.id,
            owner: parent_record.owner,
            project_id: parent_record.project_id,
            parent_generation_id: parent_record.parent_generation_id,
        };
    }

    Ok(exhausted(best, saw_private_project, depth, false, used_team_path))
}

fn exhausted(
    best: Option<(Role, AuthorizationMethod)>,
    saw_private_project: bool,
    depth: u32,
    cycle_detected: bool,
    used_team_path: bool,
) -> AccessTrace {
    let denial_reason = match best {
        Some((_, AuthorizationMethod::TeamMembership)) => DenialReason::InsufficientTeamPermissions,
        Some((_, AuthorizationMethod::Visibility)) => DenialReason::ProjectVisibilityRestricted,
        Some(_) => DenialReason::NotOwner,
        None if cycle_detected || depth > 0 => DenialReason::InheritanceExhausted,
        None if saw_private_project => DenialReason::PrivateProject,
        None => DenialReason::NotOwner,
    };
    AccessTrace {
        granted: false,
        method: best.map(|(_, m)| m),
        effective_role: best.map(|(r, _)| r),
        depth_used: depth,
        cycle_detected,
        denial_reason: Some(denial_reason),
        used_team_path,
    }
}

/// Best role/method a principal can claim at a single node, without
/// considering the parent chain. `None` means nothing at this level grants
/// any role at all.
async fn node_role(
    principal: PrincipalId,
    node: &ResolutionNode,
    access: AccessType,
    required_role: Role,
    principal_teams: &[(TeamId, Role)],
    store: &dyn PersistentStore,
) -> Result<Option<(Role, AuthorizationMethod)>, CoreError> {
    if node.owner == principal {
        return Ok(Some((Role::Owner, AuthorizationMethod::DirectOwnership)));
    }

    let Some(project_id) = node.project_id else {
        return Ok(None);
    };
    let Some(project) = store.fetch_project(project_id).await? else {
        return Ok(None);
    };

    if project.owner == principal {
        return Ok(Some((Role::Owner, AuthorizationMethod::ProjectOwnership)));
    }

    let links = store.fetch_team_project_links(project_id).await?;
    let mut best_team: Option<Role> = None;
    for link in &links {
        if let Some((_, team_role)) = principal_teams.iter().find(|(id, _)| *id == link.team_id) {
            let effective = team_role.min(link.role);
            best_team = Some(best_team.map(|r| r.max(effective)).unwrap_or(effective));
        }
    }
    if let Some(role) = best_team {
        return Ok(Some((role, AuthorizationMethod::TeamMembership)));
    }

    let is_any_team_member = !principal_teams.is_empty();
    let visibility_role = visibility_grant(project.visibility, access, required_role, is_any_team_member);
    Ok(visibility_role.map(|r| (r, AuthorizationMethod::Visibility)))
}

/// Project visibility grants a fixed, per-visibility *set* of access types
/// rather than a role on the usual hierarchy —
/// `public_full` grants `{read, share}` but deliberately NOT `write`, even
/// though `write`'s minimum role (`contributor`) is lower than `share`'s
/// (`editor`) on the role-hierarchy table. A single `Role` can't express
/// that non-monotonic set, so this returns `required_role` itself (the
/// exact level the caller is asking to satisfy) only for the access types
/// each visibility explicitly allows, and `None` otherwise.
fn visibility_grant(
    visibility: ProjectVisibility,
    access: AccessType,
    required_role: Role,
    is_any_team_member: bool,
) -> Option<Role> {
    let allowed = match visibility {
        ProjectVisibility::PublicFull => matches!(access, AccessType::Read | AccessType::Share),
        ProjectVisibility::PublicRead => access == AccessType::Read,
        ProjectVisibility::TeamOpen if is_any_team_member => {
            matches!(access, AccessType::Read | AccessType::Write)
        }
        _ => false,
    };
    allowed.then_some(required_role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::resource::{ResourceRef, ResourceType};
    use crate::domain::security_context::SecurityContext;
    use crate::external::store::{GenerationParent, Page, ProjectRecord, ResourceRecord, TeamLink};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeStore {
        resources: Mutex<HashMap<ResourceId, ResourceRecord>>,
        projects: Mutex<HashMap<ProjectId, ProjectRecord>>,
        memberships: Mutex<HashMap<PrincipalId, Vec<(TeamId, Role)>>>,
        links: Mutex<HashMap<ProjectId, Vec<TeamLink>>>,
    }

    #[async_trait]
    impl PersistentStore for FakeStore {
        async fn fetch_resource(&self, id: ResourceId) -> crate::error::CoreResult<Option<ResourceRecord>> {
            Ok(self.resources.lock().unwrap().get(&id).cloned())
        }
        async fn fetch_project(&self, id: ProjectId) -> crate::error::CoreResult<Option<ProjectRecord>> {
            Ok(self.projects.lock().unwrap().get(&id).cloned())
        }
        async fn fetch_team_memberships(&self, principal: PrincipalId) -> crate::error::CoreResult<Vec<(TeamId, Role)>> {
            Ok(self.memberships.lock().unwrap().get(&principal).cloned().unwrap_or_default())
        }
        async fn fetch_team_project_links(&self, project: ProjectId) -> crate::error::CoreResult<Vec<TeamLink>> {
            Ok(self.links.lock().unwrap().get(&project).cloned().unwrap_or_default())
        }
        async fn fetch_generation_parent(&self, _id: GenerationId) -> crate::error::CoreResult<GenerationParent> {
            Ok(GenerationParent { parent_id: None })
        }
        async fn fetch_recent_generations(
            &self,
            _principal: PrincipalId,
            _limit: usize,
            _cursor: Option<String>,
        ) -> crate::error::CoreResult<Page<GenerationId>> {
            Ok(Page { items: Vec::new(), next_cursor: None })
        }
    }

    fn request(principal: PrincipalId, resource: ResourceRef, access: AccessType) -> AuthorizationRequest {
        AuthorizationRequest::new(
            principal,
            resource,
            ResourceType::Generation,
            access,
            SecurityContext::new("127.0.0.1".parse().unwrap(), "test"),
        )
    }

    #[tokio::test]
    async fn direct_owner_is_granted() {
        let owner = PrincipalId(Uuid::new_v4());
        let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner);
        let store = FakeStore::default();
        let (result, trace) = run(&request(owner, resource, AccessType::Write), &CoreConfig::default(), &store).await;
        assert!(result.success);
        assert_eq!(trace.method, Some(AuthorizationMethod::DirectOwnership));
    }

    #[tokio::test]
    async fn unrelated_principal_on_private_project_is_denied() {
        let owner = PrincipalId(Uuid::new_v4());
        let stranger = PrincipalId(Uuid::new_v4());
        let project_id = ProjectId(Uuid::new_v4());
        let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner).with_project(project_id);

        let store = FakeStore::default();
        store.projects.lock().unwrap().insert(
            project_id,
            ProjectRecord { id: project_id, owner, visibility: ProjectVisibility::Private },
        );

        let (result, trace) = run(&request(stranger, resource, AccessType::Read), &CoreConfig::default(), &store).await;
        assert!(!result.success);
        assert_eq!(trace.denial_reason, Some(DenialReason::PrivateProject));
    }

    #[tokio::test]
    async fn team_editor_can_write_but_not_admin() {
        let owner = PrincipalId(Uuid::new_v4());
        let member = PrincipalId(Uuid::new_v4());
        let team = TeamId(Uuid::new_v4());
        let project_id = ProjectId(Uuid::new_v4());
        let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner).with_project(project_id);

        let store = FakeStore::default();
        store.projects.lock().unwrap().insert(
            project_id,
            ProjectRecord { id: project_id, owner, visibility: ProjectVisibility::TeamRestricted },
        );
        store.links.lock().unwrap().insert(project_id, vec![TeamLink { team_id: team, role: Role::Editor }]);
        store.memberships.lock().unwrap().insert(member, vec![(team, Role::Editor)]);

        let write = run(&request(member, resource.clone(), AccessType::Write), &CoreConfig::default(), &store).await;
        assert!(write.0.success);

        let admin = run(&request(member, resource, AccessType::Admin), &CoreConfig::default(), &store).await;
        assert!(!admin.0.success);
        assert_eq!(admin.1.denial_reason, Some(DenialReason::InsufficientTeamPermissions));
    }

    #[tokio::test]
    async fn public_read_project_grants_viewer_to_anyone() {
        let owner = PrincipalId(Uuid::new_v4());
        let stranger = PrincipalId(Uuid::new_v4());
        let project_id = ProjectId(Uuid::new_v4());
        let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner).with_project(project_id);

        let store = FakeStore::default();
        store.projects.lock().unwrap().insert(
            project_id,
            ProjectRecord { id: project_id, owner, visibility: ProjectVisibility::PublicRead },
        );

        let (result, trace) = run(&request(stranger, resource, AccessType::Read), &CoreConfig::default(), &store).await;
        assert!(result.success);
        assert_eq!(trace.method, Some(AuthorizationMethod::Visibility));
    }

    #[tokio::test]
    async fn public_full_grants_read_and_share_but_not_write() {
        let owner = PrincipalId(Uuid::new_v4());
        let stranger = PrincipalId(Uuid::new_v4());
        let project_id = ProjectId(Uuid::new_v4());
        let resource = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, owner).with_project(project_id);

        let store = FakeStore::default();
        store.projects.lock().unwrap().insert(
            project_id,
            ProjectRecord { id: project_id, owner, visibility: ProjectVisibility::PublicFull },
        );

        let read = run(&request(stranger, resource.clone(), AccessType::Read), &CoreConfig::default(), &store).await;
        assert!(read.0.success);

        let share = run(&request(stranger, resource.clone(), AccessType::Share), &CoreConfig::default(), &store).await;
        assert!(share.0.success);

        let write = run(&request(stranger, resource, AccessType::Write), &CoreConfig::default(), &store).await;
        assert!(!write.0.success, "public_full must not grant write");
    }

    #[tokio::test]
    async fn inheritance_from_parent_generation_grants_access() {
        let owner = PrincipalId(Uuid::new_v4());
        let parent_gen = GenerationId(Uuid::new_v4());
        let child = ResourceRef::new(ResourceId(Uuid::new_v4()), ResourceType::Generation, PrincipalId(Uuid::new_v4()))
            .with_parent(parent_gen);

        let store = FakeStore::default();
        store.resources.lock().unwrap().insert(
            ResourceId(parent_gen.0),
            ResourceRecord {
                id: ResourceId(parent_gen.0),
                owner,
                project_id: None,
                parent_generation_id: None,
            },
        );

        let (result, trace) = run(&request(owner, child, AccessType::Read), &CoreConfig::default(), &store).await;
        assert!(result.success);
        assert_eq!(trace.depth_used, 1);
    }
}
