//! Hierarchical cache key builder:
//! `auth:user:<uid>:gen:<n>:<kind>:<rid>:op:<op>`.

use std::fmt;

use crate::domain::access::AccessType;
use crate::domain::principal::PrincipalId;
use crate::domain::resource::{ResourceId, ResourceType};

/// `<kind>` component, per `spec.md` §6: `resource | generation | project |
/// team | session | profile | config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Resource,
    Generation,
    Project,
    Team,
    Session,
    Profile,
    Config,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Resource => "resource",
            KeyKind::Generation => "generation",
            KeyKind::Project => "project",
            KeyKind::Team => "team",
            KeyKind::Session => "session",
            KeyKind::Profile => "profile",
            KeyKind::Config => "config",
        }
    }
}

impl From<ResourceType> for KeyKind {
    fn from(rt: ResourceType) -> Self {
        match rt {
            ResourceType::UserProfile => KeyKind::Profile,
            ResourceType::Generation => KeyKind::Generation,
            ResourceType::Project => KeyKind::Project,
            ResourceType::Team => KeyKind::Team,
            ResourceType::AdminResource | ResourceType::SystemResource => KeyKind::Resource,
        }
    }
}

/// A fully-resolved hierarchical cache key. `Display` renders the canonical
/// colon-delimited string form; the `gen` component is the requesting
/// principal's generation counter at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub principal: PrincipalId,
    pub generation: u64,
    pub kind: KeyKind,
    pub resource: ResourceId,
    pub op: AccessType,
}

impl CacheKey {
    pub fn new(
        principal: PrincipalId,
        generation: u64,
        kind: KeyKind,
        resource: ResourceId,
        op: AccessType,
    ) -> Self {
        Self {
            principal,
            generation,
            kind,
            resource,
            op,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auth:user:{}:gen:{}:{}:{}:op:{}",
            self.principal,
            self.generation,
            self.kind.as_str(),
            self.resource,
            self.op.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::ResourceType;
    use uuid::Uuid;

    #[test]
    fn renders_the_canonical_form() {
        let principal = PrincipalId(Uuid::parse_str("11111111-1111-4111-8111-111111111111").unwrap());
        let resource = ResourceId(Uuid::parse_str("22222222-2222-4222-8222-222222222222").unwrap());
        let key = CacheKey::new(
            principal,
            3,
            KeyKind::from(ResourceType::Generation),
            resource,
            AccessType::Read,
        );
        assert_eq!(
            key.to_string(),
            "auth:user:11111111-1111-4111-8111-111111111111:gen:3:generation:22222222-2222-4222-8222-222222222222:op:read"
        );
    }
}
