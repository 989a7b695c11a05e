//! Layer 8: audit emission. Required layer, but the
//! underlying [`AuditPipeline::emit`] only reports failure when every one
//! of its four destinations is unreachable — a single degraded sink is not
//! enough to deny a request.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::event::{action_string, AuditEvent};
use crate::audit::AuditPipeline;
use crate::domain::authorization::{AuthorizationRequest, LayerResult, LayerType, ThreatLevel};
use crate::error::{CoreError, Severity};

/// SSRF and injection attempts are recorded at `CRITICAL` regardless of the
/// aggregated threat level — both are caught and denied by layer 1, before
/// the context-scoring layer that would otherwise be the only path to a
/// high threat level, but `spec.md` §8's SSRF scenario still requires
/// `CRITICAL` on the audit record.
fn has_critical_anomaly(layer_results: &[LayerResult]) -> bool {
    layer_results.iter().any(|layer| {
        layer
            .anomalies
            .iter()
            .any(|a| a == "ssrf_attempt" || a.starts_with("injection_attempt"))
    })
}

fn severity_for(outcome: bool, threat_level: ThreatLevel, layer_results: &[LayerResult]) -> Severity {
    if has_critical_anomaly(layer_results) {
        return Severity::Critical;
    }
    match (outcome, threat_level) {
        (true, ThreatLevel::Green) | (true, ThreatLevel::Yellow) => Severity::Info,
        (true, _) => Severity::Warning,
        (false, ThreatLevel::Red) => Severity::Critical,
        (false, _) => Severity::Warning,
    }
}

fn remediation_hints(outcome: bool, threat_level: ThreatLevel) -> Vec<String> {
    if outcome && threat_level < ThreatLevel::Orange {
        return Vec::new();
    }
    let mut hints = Vec::new();
    if !outcome {
        hints.push("review denial reason with the resource owner".into());
    }
    if threat_level >= ThreatLevel::Orange {
        hints.push("consider step-up authentication for this principal".into());
    }
    hints
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    request: &AuthorizationRequest,
    correlation_id: Uuid,
    outcome: bool,
    threat_level: ThreatLevel,
    layer_results_so_far: Vec<LayerResult>,
    pipeline: &AuditPipeline,
    cache_degraded: bool,
) -> LayerResult {
    let started = Instant::now();

    let mut context_summary = HashMap::new();
    context_summary.insert("risk_score".into(), request.security_context.risk_score.to_string());
    context_summary.insert("flag_count".into(), request.security_context.flags.len().to_string());
    context_summary.insert("cache_degraded".into(), cache_degraded.to_string());

    let audit_id = Uuid::new_v4();
    let timestamp = Utc::now();
    let event = AuditEvent {
        audit_id,
        event_type: "authorization_decision",
        severity: severity_for(outcome, threat_level, &layer_results_so_far),
        timestamp,
        principal: request.principal,
        resource: request.resource.id,
        client_ip: request.security_context.client_ip,
        user_agent: request.security_context.user_agent.clone(),
        action: action_string(request.access, request.resource_type),
        outcome,
        threat_level,
        layer_results: layer_results_so_far,
        execution_ms: started.elapsed().as_millis() as u64,
        security_context_summary: context_summary,
        correlation_id,
        remediation_hints: remediation_hints(outcome, threat_level),
        checksum: AuditEvent::compute_checksum(audit_id, timestamp, request.principal, outcome),
    };

    if pipeline.emit(&event).await {
        LayerResult::ok(LayerType::AuditEmission, started.elapsed())
    } else {
        LayerResult::failed(
            LayerType::AuditEmission,
            started.elapsed(),
            CoreError::DependencyUnavailable {
                dependency: "audit_sinks".into(),
                correlation_id,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::AccessType;
    use crate::domain::principal::PrincipalId;
    use crate::domain::resource::{ResourceId, ResourceRef, ResourceType};
    use crate::domain::security_context::SecurityContext;
    use crate::external::audit_sinks::InMemoryAuditBackend;
    use crate::external::cache_store::InMemorySharedStore;
    use std::sync::Arc;
    use uuid::Uuid as UuidT;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest::new(
            PrincipalId(UuidT::new_v4()),
            ResourceRef::new(ResourceId(UuidT::new_v4()), ResourceType::Generation, PrincipalId(UuidT::new_v4())),
            ResourceType::Generation,
            AccessType::Read,
            SecurityContext::new("127.0.0.1".parse().unwrap(), "test"),
        )
    }

    #[tokio::test]
    async fn emitting_with_live_sinks_succeeds() {
        let backend = Arc::new(InMemoryAuditBackend::new());
        let pipeline = AuditPipeline::new(Arc::new(InMemorySharedStore::new()), backend.clone(), backend.clone());
        let result = run(&request(), UuidT::new_v4(), true, ThreatLevel::Green, Vec::new(), &pipeline, false).await;
        assert!(result.success);
    }
}
