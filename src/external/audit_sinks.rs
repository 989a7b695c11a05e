//! The two genuinely external audit destinations of `spec.md` §4.6: a
//! SIEM-formatted stream and a long-retention store keyed by audit id and
//! indexed by date. The other two sinks (short-retention real-time ring
//! buffer, structured application log) are implemented in-process by
//! `crate::audit::logger` since they need no external collaborator.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::CoreResult;

/// A batch of CEF-formatted records destined for the SIEM.
#[async_trait]
pub trait SiemSink: Send + Sync {
    async fn send_batch(&self, cef_records: Vec<String>) -> CoreResult<()>;
}

/// Durable, queryable-by-id-and-date audit storage.
#[async_trait]
pub trait LongTermAuditStore: Send + Sync {
    async fn store(&self, audit_id: Uuid, date: NaiveDate, payload: Vec<u8>) -> CoreResult<()>;
    async fn fetch(&self, audit_id: Uuid) -> CoreResult<Option<Vec<u8>>>;
    async fn fetch_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Uuid>>;
}

/// In-memory reference implementation of both sinks, used by tests and the
/// demo binary. Neither sink denies authorization on failure — callers treat `Err` here as "this sink degraded", not as a
/// request failure.
#[derive(Default)]
pub struct InMemoryAuditBackend {
    siem_batches: parking_lot::Mutex<Vec<Vec<String>>>,
    store: dashmap::DashMap<Uuid, (NaiveDate, Vec<u8>)>,
}

impl InMemoryAuditBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiemSink for InMemoryAuditBackend {
    async fn send_batch(&self, cef_records: Vec<String>) -> CoreResult<()> {
        self.siem_batches.lock().push(cef_records);
        Ok(())
    }
}

#[async_trait]
impl LongTermAuditStore for InMemoryAuditBackend {
    async fn store(&self, audit_id: Uuid, date: NaiveDate, payload: Vec<u8>) -> CoreResult<()> {
        self.store.insert(audit_id, (date, payload));
        Ok(())
    }

    async fn fetch(&self, audit_id: Uuid) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.store.get(&audit_id).map(|e| e.1.clone()))
    }

    async fn fetch_by_date(&self, date: NaiveDate) -> CoreResult<Vec<Uuid>> {
        Ok(self
            .store
            .iter()
            .filter(|e| e.value().0 == date)
            .map(|e| *e.key())
            .collect())
    }
}
