//! Layer 9: anomaly correlation, advisory. Pulls
//! the recent event window from the audit pipeline's short-retention
//! stream and runs [`CorrelationEngine`] over it; a matched pattern
//! escalates the aggregated threat level by one step rather than denying.

use std::time::Instant;

use crate::audit::{AuditPipeline, CorrelationEngine};
use crate::domain::authorization::{LayerResult, LayerType, ThreatLevel};

/// Window of recent events scanned per request.
const CORRELATION_WINDOW: usize = 200;

pub async fn run(pipeline: &AuditPipeline, engine: &CorrelationEngine) -> LayerResult {
    let started = Instant::now();
    let events = pipeline.recent_events(CORRELATION_WINDOW).await;
    let alerts = engine.evaluate(&events);

    if alerts.is_empty() {
        return LayerResult::ok(LayerType::AnomalyCorrelation, started.elapsed());
    }

    let mut result = LayerResult::ok(LayerType::AnomalyCorrelation, started.elapsed())
        .with_threat_level(ThreatLevel::Green.escalate_one_step());
    for alert in &alerts {
        result = result.with_anomaly(alert.pattern.as_str());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::audit_sinks::InMemoryAuditBackend;
    use crate::external::cache_store::InMemorySharedStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_stream_yields_no_anomalies() {
        let backend = Arc::new(InMemoryAuditBackend::new());
        let pipeline = AuditPipeline::new(Arc::new(InMemorySharedStore::new()), backend.clone(), backend.clone());
        let result = run(&pipeline, &CorrelationEngine::new()).await;
        assert!(result.success);
        assert!(result.anomalies.is_empty());
    }
}
