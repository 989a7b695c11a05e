//! Anomaly correlation across recent audit events: a rolling window per
//! principal and IP, scored against a handful of abuse patterns.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::principal::PrincipalId;
use crate::domain::resource::ResourceId;
use crate::error::Severity;

use super::event::AuditEvent;

/// The four correlation patterns the engine watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationPattern {
    BruteForce,
    EscalationPattern,
    InjectionPattern,
    GeographicCluster,
}

impl CorrelationPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrelationPattern::BruteForce => "brute_force",
            CorrelationPattern::EscalationPattern => "escalation_pattern",
            CorrelationPattern::InjectionPattern => "injection_pattern",
            CorrelationPattern::GeographicCluster => "geographic_cluster",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub pattern: CorrelationPattern,
    pub severity: Severity,
    pub affected_principals: Vec<PrincipalId>,
    pub affected_resources: Vec<ResourceId>,
    pub recommended_actions: Vec<String>,
    pub acknowledged: bool,
}

/// Evaluates the four correlation rules over a window of recent events.
/// Stateless by design: the caller supplies whatever window of events it
/// wants scanned (typically pulled from the short-retention stream via
/// `AuditPipeline::recent_events`), so this has no background task of its
/// own — it is invoked by the anomaly-correlation layer on each request and,
/// separately, can be driven by a periodic task for operator-facing alerts.
pub struct CorrelationEngine;

impl CorrelationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, events: &[AuditEvent]) -> Vec<Alert> {
        let now = Utc::now();
        let mut alerts = Vec::new();

        if let Some(alert) = self.brute_force(events, now) {
            alerts.push(alert);
        }
        if let Some(alert) = self.escalation_pattern(events, now) {
            alerts.push(alert);
        }
        if let Some(alert) = self.injection_pattern(events) {
            alerts.push(alert);
        }
        if let Some(alert) = self.geographic_cluster(events, now) {
            alerts.push(alert);
        }
        alerts
    }

    /// ≥ 10 failures from one IP in 5 minutes.
    fn brute_force(&self, events: &[AuditEvent], now: chrono::DateTime<Utc>) -> Option<Alert> {
        let window = ChronoDuration::minutes(5);
        let mut by_ip: HashMap<IpAddr, (u32, Vec<PrincipalId>)> = HashMap::new();
        for event in events {
            if event.outcome || now - event.timestamp > window {
                continue;
            }
            let entry = by_ip.entry(event.client_ip).or_insert((0, Vec::new()));
            entry.0 += 1;
            entry.1.push(event.principal);
        }
        let (ip, (count, principals)) = by_ip.into_iter().max_by_key(|(_, (c, _))| *c)?;
        if count < 10 {
            return None;
        }
        Some(Alert {
            alert_id: Uuid::new_v4(),
            pattern: CorrelationPattern::BruteForce,
            severity: Severity::Critical,
            affected_principals: dedup(principals),
            affected_resources: Vec::new(),
            recommended_actions: vec![format!("block ip {ip}"), "force password reset".into()],
            acknowledged: false,
        })
    }

    /// ≥ 3 privilege-escalation anomalies in 10 minutes.
    fn escalation_pattern(&self, events: &[AuditEvent], now: chrono::DateTime<Utc>) -> Option<Alert> {
        let window = ChronoDuration::minutes(10);
        let mut by_principal: HashMap<PrincipalId, u32> = HashMap::new();
        for event in events {
            if now - event.timestamp > window {
                continue;
            }
            if event.action.ends_with("_admin") && !event.outcome {
                *by_principal.entry(event.principal).or_default() += 1;
            }
        }
        let (principal, count) = by_principal.into_iter().max_by_key(|(_, c)| *c)?;
        if count < 3 {
            return None;
        }
        Some(Alert {
            alert_id: Uuid::new_v4(),
            pattern: CorrelationPattern::EscalationPattern,
            severity: Severity::Critical,
            affected_principals: vec![principal],
            affected_resources: Vec::new(),
            recommended_actions: vec!["review recent admin access attempts".into()],
            acknowledged: false,
        })
    }

    /// ≥ 1 injection anomaly.
    fn injection_pattern(&self, events: &[AuditEvent]) -> Option<Alert> {
        let offenders: Vec<&AuditEvent> = events
            .iter()
            .filter(|e| e.layer_results.iter().any(|l| l.anomalies.iter().any(|a| a.contains("injection"))))
            .collect();
        if offenders.is_empty() {
            return None;
        }
        Some(Alert {
            alert_id: Uuid::new_v4(),
            pattern: CorrelationPattern::InjectionPattern,
            severity: Severity::Critical,
            affected_principals: dedup(offenders.iter().map(|e| e.principal).collect()),
            affected_resources: dedup_resources(offenders.iter().map(|e| e.resource).collect()),
            recommended_actions: vec!["quarantine originating session".into()],
            acknowledged: false,
        })
    }

    /// ≥ 5 geographic anomalies for one principal in 30 minutes.
    fn geographic_cluster(&self, events: &[AuditEvent], now: chrono::DateTime<Utc>) -> Option<Alert> {
        let window = ChronoDuration::minutes(30);
        let mut by_principal: HashMap<PrincipalId, u32> = HashMap::new();
        for event in events {
            if now - event.timestamp > window {
                continue;
            }
            if event
                .layer_results
                .iter()
                .any(|l| l.anomalies.iter().any(|a| a == "GEOGRAPHIC_ANOMALY"))
            {
                *by_principal.entry(event.principal).or_default() += 1;
            }
        }
        let (principal, count) = by_principal.into_iter().max_by_key(|(_, c)| *c)?;
        if count < 5 {
            return None;
        }
        Some(Alert {
            alert_id: Uuid::new_v4(),
            pattern: CorrelationPattern::GeographicCluster,
            severity: Severity::Error,
            affected_principals: vec![principal],
            affected_resources: Vec::new(),
            recommended_actions: vec!["prompt for step-up authentication".into()],
            acknowledged: false,
        })
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn dedup(mut ids: Vec<PrincipalId>) -> Vec<PrincipalId> {
    ids.sort_by_key(|p| p.0);
    ids.dedup();
    ids
}

fn dedup_resources(mut ids: Vec<ResourceId>) -> Vec<ResourceId> {
    ids.sort_by_key(|r| r.0);
    ids.dedup();
    ids
}
