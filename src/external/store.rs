//! The relational-store queries the core consumes. All
//! queries are parameterized; no string concatenation — implementations
//! back this trait with a real driver (the teacher's dependency table
//! carries `sqlx`/`deadpool` behind the `postgres-store` feature for
//! exactly this purpose).

use async_trait::async_trait;

use crate::domain::principal::{PrincipalId, TeamId};
use crate::domain::resource::{GenerationId, ProjectId, ResourceId};
use crate::domain::role::Role;
use crate::domain::visibility::ProjectVisibility;
use crate::error::CoreResult;

/// Resource row as fetched for access-control resolution.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub owner: PrincipalId,
    pub project_id: Option<ProjectId>,
    pub parent_generation_id: Option<GenerationId>,
}

/// Project row.
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub owner: PrincipalId,
    pub visibility: ProjectVisibility,
}

/// A team linked to a project, carrying the role the link grants.
#[derive(Debug, Clone)]
pub struct TeamLink {
    pub team_id: TeamId,
    pub role: Role,
}

/// A generation's parent, for the inheritance walk.
#[derive(Debug, Clone)]
pub struct GenerationParent {
    pub parent_id: Option<GenerationId>,
}

/// Cursor-paginated page, used by the warmers.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn fetch_resource(&self, id: ResourceId) -> CoreResult<Option<ResourceRecord>>;
    async fn fetch_project(&self, id: ProjectId) -> CoreResult<Option<ProjectRecord>>;
    async fn fetch_team_memberships(
        &self,
        principal: PrincipalId,
    ) -> CoreResult<Vec<(TeamId, Role)>>;
    async fn fetch_team_project_links(&self, project: ProjectId) -> CoreResult<Vec<TeamLink>>;
    async fn fetch_generation_parent(&self, id: GenerationId) -> CoreResult<GenerationParent>;

    /// Paginated recent generations for a principal, used by the triggered
    /// warmer, bounded to `limit` (the warmer caps this at
    /// 20).
    async fn fetch_recent_generations(
        &self,
        principal: PrincipalId,
        limit: usize,
        cursor: Option<String>,
    ) -> CoreResult<Page<GenerationId>>;
}
