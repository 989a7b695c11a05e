//! Audit event shape: every authorization decision, successful or not,
//! is recorded as one of these, keyed by an action string of
//! `<access>_<resource_type>` and carrying a tamper-evident checksum.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::authorization::{LayerResult, ThreatLevel};
use crate::domain::principal::PrincipalId;
use crate::domain::resource::ResourceId;
use crate::error::Severity;

/// Hints attached to an audit event for the operator to act on, e.g.
/// "rotate credentials", "block IP". Free text by design — remediation
/// advice doesn't need a closed enum the way incident *kinds* do.
pub type RemediationHints = Vec<String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub audit_id: Uuid,
    pub event_type: &'static str,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub principal: PrincipalId,
    pub resource: ResourceId,
    pub client_ip: IpAddr,
    pub user_agent: String,
    pub action: String,
    pub outcome: bool,
    pub threat_level: ThreatLevel,
    pub layer_results: Vec<LayerResult>,
    pub execution_ms: u64,
    pub security_context_summary: HashMap<String, String>,
    pub correlation_id: Uuid,
    pub remediation_hints: RemediationHints,
    pub checksum: String,
}

impl AuditEvent {
    /// Tamper-evident checksum = SHA-256 of `(audit_id, timestamp,
    /// principal id, outcome)`.
    pub fn compute_checksum(
        audit_id: Uuid,
        timestamp: DateTime<Utc>,
        principal: PrincipalId,
        outcome: bool,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(audit_id.as_bytes());
        hasher.update(timestamp.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        hasher.update(principal.0.as_bytes());
        hasher.update([outcome as u8]);
        hex::encode(hasher.finalize())
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.audit_id, self.timestamp, self.principal, self.outcome)
    }
}

/// Builds the `<access>_<resource_type>` action string recorded on every
/// audit event.
pub fn action_string(access: crate::domain::access::AccessType, resource_type: crate::domain::resource::ResourceType) -> String {
    format!("{}_{}", access.as_str(), resource_type.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips() {
        let audit_id = Uuid::new_v4();
        let principal = PrincipalId(Uuid::new_v4());
        let timestamp = Utc::now();
        let checksum = AuditEvent::compute_checksum(audit_id, timestamp, principal, true);

        let event = AuditEvent {
            audit_id,
            event_type: "authorization_decision",
            severity: Severity::Info,
            timestamp,
            principal,
            resource: ResourceId(Uuid::new_v4()),
            client_ip: "127.0.0.1".parse().unwrap(),
            user_agent: "test".into(),
            action: "read_generation".into(),
            outcome: true,
            threat_level: ThreatLevel::Green,
            layer_results: Vec::new(),
            execution_ms: 5,
            security_context_summary: HashMap::new(),
            correlation_id: Uuid::new_v4(),
            remediation_hints: Vec::new(),
            checksum,
        };

        assert!(event.verify_checksum());
    }

    #[test]
    fn tampering_with_outcome_breaks_the_checksum() {
        let audit_id = Uuid::new_v4();
        let principal = PrincipalId(Uuid::new_v4());
        let timestamp = Utc::now();
        let checksum = AuditEvent::compute_checksum(audit_id, timestamp, principal, true);

        let mut event = AuditEvent {
            audit_id,
            event_type: "authorization_decision",
            severity: Severity::Info,
            timestamp,
            principal,
            resource: ResourceId(Uuid::new_v4()),
            client_ip: "127.0.0.1".parse().unwrap(),
            user_agent: "test".into(),
            action: "read_generation".into(),
            outcome: true,
            threat_level: ThreatLevel::Green,
            layer_results: Vec::new(),
            execution_ms: 5,
            security_context_summary: HashMap::new(),
            correlation_id: Uuid::new_v4(),
            remediation_hints: Vec::new(),
            checksum,
        };
        event.outcome = false;
        assert!(!event.verify_checksum());
    }
}
