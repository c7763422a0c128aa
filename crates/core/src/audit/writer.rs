use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};

/// Events pulled off the channel per wakeup.
const BATCH: usize = 64;

/// Drains the audit channel into an [`AuditStore`].
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    fn record(envelope: AuditEventEnvelope) -> AuditRecord {
        let AuditEventEnvelope { timestamp, event } = envelope;
        AuditRecord {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            order_id: event.order_id().map(String::from),
            scheme_id: event.scheme_id(),
            data: event,
        }
    }

    /// Persist events until every [`AuditHandle`] is dropped and the channel drains.
    ///
    /// A failed insert is logged and skipped; checkout never waits on the audit log.
    pub async fn run(mut self) {
        info!("Audit writer started");
        let mut batch = Vec::with_capacity(BATCH);
        let mut written = 0usize;
        let mut failed = 0usize;

        while self.rx.recv_many(&mut batch, BATCH).await > 0 {
            debug!("Writing {} audit events", batch.len());
            for envelope in batch.drain(..) {
                let record = Self::record(envelope);
                match self.store.insert(&record) {
                    Ok(_) => written += 1,
                    Err(e) => {
                        failed += 1;
                        error!("Failed to write {} audit event: {}", record.event_type, e);
                    }
                }
            }
        }

        info!(
            "Audit writer shutting down ({} written, {} failed)",
            written, failed
        );
    }
}

/// Wire a handle to a writer over a bounded channel of `buffer_size` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into every component that emits events.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter};

    /// Store that keeps records in memory, optionally failing every insert.
    struct MockStore {
        records: Mutex<Vec<AuditRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn get_records(&self) -> Vec<AuditRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditStore for MockStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.should_fail {
                return Err(AuditError::Database("Mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            let mut stored = record.clone();
            stored.id = id;
            records.push(stored);
            Ok(id)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }
    }

    fn system(store: &Arc<MockStore>) -> (AuditHandle, AuditWriter) {
        let store_dyn: Arc<dyn AuditStore> = Arc::clone(store) as Arc<dyn AuditStore>;
        create_audit_system(store_dyn, 10)
    }

    #[tokio::test]
    async fn test_writer_receives_and_stores_events() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = system(&store);
        let writer_handle = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::ServiceStarted {
                version: "0.1.0".to_string(),
                config_hash: "abc123".to_string(),
            })
            .await;

        drop(handle);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event_type, "service_started");
    }

    #[tokio::test]
    async fn test_writer_extracts_order_and_scheme() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = system(&store);
        let writer_handle = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::TicketFinalized {
                ticket_id: "t-1".to_string(),
                order_id: "order_abc".to_string(),
                payment_id: "pay_abc".to_string(),
                scheme_id: 3,
                ticket_number: 30_001,
                amount_paid: 200,
            })
            .await;

        drop(handle);
        writer_handle.await.unwrap();

        let records = store.get_records();
        assert_eq!(records[0].order_id.as_deref(), Some("order_abc"));
        assert_eq!(records[0].scheme_id, Some(3));
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::failing());
        let (handle, writer) = system(&store);
        let writer_handle = tokio::spawn(writer.run());

        handle
            .emit(AuditEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        drop(handle);
        writer_handle.await.unwrap();
        assert!(store.get_records().is_empty());
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles_to_drop() {
        let store = Arc::new(MockStore::new());
        let (main_handle, writer) = system(&store);
        let sweeper_handle = main_handle.clone();
        let writer_handle = tokio::spawn(writer.run());

        sweeper_handle
            .emit(AuditEvent::ClaimsExpired {
                count: 1,
                claim_ids: vec!["c-1".to_string()],
            })
            .await;
        main_handle
            .emit(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;

        drop(main_handle);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(
            !writer_handle.is_finished(),
            "Writer should still be running with handles alive"
        );

        drop(sweeper_handle);
        let result = tokio::time::timeout(tokio::time::Duration::from_secs(1), writer_handle).await;
        assert!(result.is_ok(), "Writer should exit after all handles dropped");

        let records = store.get_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "claims_expired");
        assert_eq!(records[1].event_type, "service_stopped");
    }
}
