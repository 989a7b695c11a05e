//! Layer 10: emergency recovery. Not part of the
//! normal ordered sequence — the orchestrator invokes this only when a
//! required layer returns an unexpected error rather than a clean denial
//! (store outage, timeout, panic-caught path). Grants nothing beyond
//! direct-ownership read access and always emits a critical audit event,
//! since reaching this layer means the normal chain could not be trusted.

use std::time::Instant;

use uuid::Uuid;

use crate::audit::event::{action_string, AuditEvent};
use crate::audit::AuditPipeline;
use crate::domain::access::AccessType;
use crate::domain::authorization::{AuthorizationMethod, AuthorizationRequest, LayerResult, LayerType, ThreatLevel};
use crate::domain::visibility::ProjectVisibility;
use crate::error::{CoreError, DenialReason, Severity};
use crate::external::store::PersistentStore;

pub struct EmergencyOutcome {
    pub granted: bool,
    pub method: Option<AuthorizationMethod>,
}

/// Read-only allowance on resources marked `public_read` or `public_full`.
/// The project lookup itself goes through the same fallible store the
/// normal chain uses; a lookup failure here just means the public-read
/// allowance doesn't apply, not a second unhandled error — this path is
/// the last line of defense and must not itself throw.
async fn public_read_allows(request: &AuthorizationRequest, store: &dyn PersistentStore) -> bool {
    if request.access != AccessType::Read {
        return false;
    }
    let Some(project_id) = request.resource.project_id else {
        return false;
    };
    matches!(
        store.fetch_project(project_id).await,
        Ok(Some(project)) if project.visibility == ProjectVisibility::PublicRead || project.visibility == ProjectVisibility::PublicFull
    )
}

pub async fn run(
    request: &AuthorizationRequest,
    correlation_id: Uuid,
    triggering_error: &CoreError,
    pipeline: &AuditPipeline,
    store: &dyn PersistentStore,
) -> (LayerResult, EmergencyOutcome) {
    let started = Instant::now();

    let direct_ownership = request.access == AccessType::Read && request.resource.owned_by(request.principal);
    let granted = direct_ownership || public_read_allows(request, store).await;

    let audit_id = Uuid::new_v4();
    let timestamp = chrono::Utc::now();
    let event = AuditEvent {
        audit_id,
        event_type: "emergency_recovery",
        severity: Severity::Critical,
        timestamp,
        principal: request.principal,
        resource: request.resource.id,
        client_ip: request.security_context.client_ip,
        user_agent: request.security_context.user_agent.clone(),
        action: action_string(request.access, request.resource_type),
        outcome: granted,
        threat_level: ThreatLevel::Red,
        layer_results: Vec::new(),
        execution_ms: started.elapsed().as_millis() as u64,
        security_context_summary: std::collections::HashMap::from([(
            "triggering_error".to_string(),
            triggering_error.to_string(),
        )]),
        correlation_id,
        remediation_hints: vec![
            "investigate why the primary authorization chain failed".into(),
            "confirm emergency-path grants are expected".into(),
        ],
        checksum: AuditEvent::compute_checksum(audit_id, timestamp, request.principal, granted),
    };
    pipeline.emit(&event).await;

    let outcome = EmergencyOutcome {
        granted,
        method: granted.then_some(AuthorizationMethod::Emergency),
    };

    let result = if granted {
        LayerResult::ok(LayerType::EmergencyRecovery, started.elapsed())
            .with_threat_level(ThreatLevel::Red)
            .with_anomaly("emergency_path_used")
    } else {
        LayerResult::failed(
            LayerType::EmergencyRecovery,
            started.elapsed(),
            CoreError::Unauthorized {
                reason: DenialReason::NotOwner,
                correlation_id,
            },
        )
        .with_threat_level(ThreatLevel::Red)
    };

    (result, outcome)
}
