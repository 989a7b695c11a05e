//! Resource data model.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::principal::PrincipalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub Uuid);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationId(pub Uuid);

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    UserProfile,
    Generation,
    Project,
    Team,
    AdminResource,
    SystemResource,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::UserProfile => "user_profile",
            ResourceType::Generation => "generation",
            ResourceType::Project => "project",
            ResourceType::Team => "team",
            ResourceType::AdminResource => "admin_resource",
            ResourceType::SystemResource => "system_resource",
        }
    }

    /// `<kind>` component used in cache keys.
    pub fn cache_kind(self) -> &'static str {
        match self {
            ResourceType::UserProfile => "profile",
            ResourceType::Generation => "generation",
            ResourceType::Project => "project",
            ResourceType::Team => "team",
            ResourceType::AdminResource | ResourceType::SystemResource => "resource",
        }
    }
}

/// A reference to the resource under authorization, carrying just enough
/// of its shape for the access-control resolution engine (§4.2.1) and the
/// team/role inheritance walk (§4.2, layer 5/6) to run without a database
/// round trip for already-fetched data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: ResourceId,
    pub kind: ResourceType,
    pub owner: PrincipalId,
    pub project_id: Option<ProjectId>,
    pub parent_generation_id: Option<GenerationId>,
}

impl ResourceRef {
    pub fn new(id: ResourceId, kind: ResourceType, owner: PrincipalId) -> Self {
        Self {
            id,
            kind,
            owner,
            project_id: None,
            parent_generation_id: None,
        }
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_parent(mut self, parent: GenerationId) -> Self {
        self.parent_generation_id = Some(parent);
        self
    }

    pub fn owned_by(&self, principal: PrincipalId) -> bool {
        self.owner == principal
    }
}
