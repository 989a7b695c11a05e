//! Core data model shared by the authorization and cache engines.
//!
//! Everything here is a plain value type: the domain model carries no
//! behavior beyond the invariants `spec.md` §3 assigns to it (role
//! satisfaction, visibility defaults, threat-level ordering). Components
//! that *act* on these values (the orchestrator, the layers, the cache
//! tiers) live in their own modules.

pub mod access;
pub mod authorization;
pub mod principal;
pub mod resource;
pub mod role;
pub mod security_context;
pub mod visibility;

pub use access::AccessType;
pub use authorization::{
    AuthorizationMethod, AuthorizationRequest, AuthorizationResponse, LayerResult, LayerType,
    ThreatLevel,
};
pub use principal::{PrincipalId, Principal, TeamId, TeamMembership};
pub use resource::{GenerationId, ProjectId, ResourceId, ResourceRef, ResourceType};
pub use role::Role;
pub use security_context::{GeoInfo, SecurityContext, SecurityFlag, UserAgentInfo};
pub use visibility::ProjectVisibility;
