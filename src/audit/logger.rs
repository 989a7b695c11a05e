//! Audit event fan-out: a direct parallel write across four destinations —
//! structured log (in process, via `tracing`), SIEM stream (external,
//! CEF-formatted), a short-retention real-time ring buffer (the L2 store's
//! capped stream), and a long-retention store keyed by audit id and
//! indexed by date.
//!
//! A destination failing never denies authorization; the
//! audit step itself is only considered failed if every destination fails.

use std::sync::Arc;

use bincode;
use chrono::Utc;

use crate::external::audit_sinks::{LongTermAuditStore, SiemSink};
use crate::external::cache_store::SharedCacheStore;

use super::cef::to_cef;
use super::event::AuditEvent;

/// Real-time stream cap.
const REALTIME_STREAM_CAP: usize = 1000;
const REALTIME_STREAM_KEY: &str = "audit:stream:realtime";

pub struct AuditPipeline {
    l2: Arc<dyn SharedCacheStore>,
    siem: Arc<dyn SiemSink>,
    long_term: Arc<dyn LongTermAuditStore>,
}

impl AuditPipeline {
    pub fn new(
        l2: Arc<dyn SharedCacheStore>,
        siem: Arc<dyn SiemSink>,
        long_term: Arc<dyn LongTermAuditStore>,
    ) -> Self {
        Self {
            l2,
            siem,
            long_term,
        }
    }

    /// Emits one audit event to all four destinations in parallel. Returns
    /// whether at least one destination succeeded.
    pub async fn emit(&self, event: &AuditEvent) -> bool {
        tracing::event!(
            tracing::Level::INFO,
            audit_id = %event.audit_id,
            event_type = event.event_type,
            principal = %event.principal,
            resource = %event.resource,
            outcome = event.outcome,
            threat_level = ?event.threat_level,
            correlation_id = %event.correlation_id,
            "authorization audit event"
        );
        // The structured-log sink above never fails from this process's
        // point of view, so `log_ok` is always true; it still counts
        // toward the "at least one sink succeeded" rule.
        let log_ok = true;

        let cef = to_cef(event);
        let encoded = bincode::serialize(event).unwrap_or_default();

        let (siem_ok, stream_ok, store_ok) = tokio::join!(
            async {
                self.siem.send_batch(vec![cef]).await.is_ok()
            },
            async {
                self.l2
                    .stream_append(REALTIME_STREAM_KEY, encoded.clone(), REALTIME_STREAM_CAP)
                    .await
                    .is_ok()
            },
            async {
                self.long_term
                    .store(event.audit_id, Utc::now().date_naive(), encoded)
                    .await
                    .is_ok()
            }
        );

        if !siem_ok {
            tracing::warn!(audit_id = %event.audit_id, "siem sink degraded");
        }
        if !stream_ok {
            tracing::warn!(audit_id = %event.audit_id, "realtime stream degraded");
        }
        if !store_ok {
            tracing::warn!(audit_id = %event.audit_id, "long-term audit store degraded");
        }

        log_ok || siem_ok || stream_ok || store_ok
    }

    /// The most recent events from the short-retention stream, used by the
    /// correlation engine.
    pub async fn recent_events(&self, count: usize) -> Vec<AuditEvent> {
        let raw = self
            .l2
            .stream_recent(REALTIME_STREAM_KEY, count)
            .await
            .unwrap_or_default();
        raw.into_iter()
            .filter_map(|bytes| bincode::deserialize(&bytes).ok())
            .collect()
    }
}
