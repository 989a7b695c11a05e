//! Authorization request/response shapes and the per-layer result type
//!.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::AccessType;
use super::principal::PrincipalId;
use super::resource::{ResourceId, ResourceRef, ResourceType};
use super::security_context::SecurityContext;
use crate::error::CoreError;

/// Ordinal threat level aggregated across layers. `Ord` is derived in
/// declaration order so `threat_level >= ThreatLevel::Red` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl ThreatLevel {
    /// Raise by exactly one step, saturating at `Red`. Used when an
    /// advisory layer fails.
    pub fn escalate_one_step(self) -> Self {
        match self {
            ThreatLevel::Green => ThreatLevel::Yellow,
            ThreatLevel::Yellow => ThreatLevel::Orange,
            ThreatLevel::Orange | ThreatLevel::Red => ThreatLevel::Red,
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }
}

impl Default for ThreatLevel {
    fn default() -> Self {
        ThreatLevel::Green
    }
}

/// The ten layers of `spec.md` §4.2, in their fixed total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerType {
    InputValidation,
    RateLimiting,
    SecurityContextValidation,
    AccessControl,
    TeamRoleInheritance,
    InheritanceDepthGuard,
    MediaAccessAuthorization,
    AuditEmission,
    AnomalyCorrelation,
    EmergencyRecovery,
}

impl LayerType {
    pub fn is_required(self) -> bool {
        !matches!(
            self,
            LayerType::SecurityContextValidation
                | LayerType::AnomalyCorrelation
                | LayerType::EmergencyRecovery
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayerType::InputValidation => "input_validation",
            LayerType::RateLimiting => "rate_limiting",
            LayerType::SecurityContextValidation => "security_context_validation",
            LayerType::AccessControl => "access_control",
            LayerType::TeamRoleInheritance => "team_role_inheritance",
            LayerType::InheritanceDepthGuard => "inheritance_depth_guard",
            LayerType::MediaAccessAuthorization => "media_access_authorization",
            LayerType::AuditEmission => "audit_emission",
            LayerType::AnomalyCorrelation => "anomaly_correlation",
            LayerType::EmergencyRecovery => "emergency_recovery",
        }
    }
}

/// How an access decision was ultimately reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationMethod {
    DirectOwnership,
    ProjectOwnership,
    TeamMembership,
    Visibility,
    Inheritance,
    Emergency,
}

/// Result returned by a single layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerResult {
    pub layer: LayerType,
    pub success: bool,
    pub execution: Duration,
    pub threat_level: ThreatLevel,
    pub anomalies: Vec<String>,
    pub cache_hit: bool,
    pub metadata: HashMap<String, String>,
    pub error: Option<String>,
}

impl LayerResult {
    pub fn ok(layer: LayerType, execution: Duration) -> Self {
        Self {
            layer,
            success: true,
            execution,
            threat_level: ThreatLevel::Green,
            anomalies: Vec::new(),
            cache_hit: false,
            metadata: HashMap::new(),
            error: None,
        }
    }

    pub fn failed(layer: LayerType, execution: Duration, error: CoreError) -> Self {
        Self {
            layer,
            success: false,
            execution,
            threat_level: ThreatLevel::Orange,
            anomalies: Vec::new(),
            cache_hit: false,
            metadata: HashMap::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn with_threat_level(mut self, level: ThreatLevel) -> Self {
        self.threat_level = level;
        self
    }

    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = hit;
        self
    }

    pub fn with_anomaly(mut self, anomaly: impl Into<String>) -> Self {
        self.anomalies.push(anomaly.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Signed, time-bounded grant for underlying media URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaGrant {
    pub grant_id: Uuid,
    pub principal: PrincipalId,
    pub resource: ResourceId,
    pub operations: Vec<AccessType>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub signed_urls: Vec<String>,
}

/// Input to an authorization decision.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub principal: PrincipalId,
    pub resource: ResourceRef,
    pub resource_type: ResourceType,
    pub access: AccessType,
    pub security_context: SecurityContext,
    pub metadata: HashMap<String, String>,
    /// Request carries a media-grant flag.
    pub media_grant_requested: bool,
    pub media_grant_expires_in: Option<Duration>,
    /// True for strict-mode identifier validation (layer 1).
    pub strict_validation: bool,
}

impl AuthorizationRequest {
    pub fn new(
        principal: PrincipalId,
        resource: ResourceRef,
        resource_type: ResourceType,
        access: AccessType,
        security_context: SecurityContext,
    ) -> Self {
        Self {
            principal,
            resource,
            resource_type,
            access,
            security_context,
            metadata: HashMap::new(),
            media_grant_requested: false,
            media_grant_expires_in: None,
            strict_validation: true,
        }
    }

    pub fn with_media_grant(mut self, expires_in: Option<Duration>) -> Self {
        self.media_grant_requested = true;
        self.media_grant_expires_in = expires_in;
        self
    }
}

/// Output of an authorization decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub granted: bool,
    pub threat_level: ThreatLevel,
    pub layer_results: Vec<LayerResult>,
    pub execution_time: Duration,
    pub media_grant: Option<MediaGrant>,
    pub audit_correlation_id: Uuid,
    pub cache_hit: bool,
    pub system_used: &'static str,
    pub access_method: Option<AuthorizationMethod>,
    pub denial_reason: Option<String>,
}

impl AuthorizationResponse {
    /// Sum of individual layer execution times, used by the invariant in
    /// `spec.md` §8 (`sum(layer times) <= reported total`).
    pub fn sum_layer_time(&self) -> Duration {
        self.layer_results.iter().map(|l| l.execution).sum()
    }
}
