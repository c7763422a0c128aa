//! Background task that releases claims whose TTL elapsed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics::SWEEPS_TOTAL;

use super::{Claim, ReleaseReason, ReservationLedger};

pub struct ClaimSweeper {
    ledger: Arc<ReservationLedger>,
    interval: Duration,
    audit: Option<AuditHandle>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ClaimSweeper {
    pub fn new(
        ledger: Arc<ReservationLedger>,
        interval: Duration,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ledger,
            interval,
            audit,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the sweep loop.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Claim sweeper already running");
            return;
        }

        let ledger = Arc::clone(&self.ledger);
        let audit = self.audit.clone();
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Claim sweeper received shutdown");
                        break;
                    }
                    _ = ticker.tick() => {
                        sweep(&ledger, audit.as_ref()).await;
                    }
                }
            }

            running.store(false, Ordering::SeqCst);
        });

        info!("Claim sweeper started (every {:?})", self.interval);
    }

    /// Signal the loop to exit.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            warn!("Claim sweeper not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
        info!("Claim sweeper stopped");
    }

    /// Run one sweep immediately.
    pub async fn sweep_once(&self) -> Vec<Claim> {
        sweep(&self.ledger, self.audit.as_ref()).await
    }
}

async fn sweep(ledger: &ReservationLedger, audit: Option<&AuditHandle>) -> Vec<Claim> {
    SWEEPS_TOTAL.inc();
    let expired = ledger.sweep_expired(Utc::now());
    if expired.is_empty() {
        return expired;
    }

    info!("Released {} expired claims", expired.len());
    if let Some(audit) = audit {
        audit
            .emit(AuditEvent::ClaimsExpired {
                count: expired.len(),
                claim_ids: expired.iter().map(|c| c.id.clone()).collect(),
            })
            .await;

        // Per-order record so a late payment can be traced to its release.
        for claim in &expired {
            let Some(order_id) = claim.gateway_order_id() else {
                continue;
            };
            audit
                .emit(AuditEvent::ClaimReleased {
                    claim_id: claim.id.clone(),
                    scheme_id: claim.key.scheme_id,
                    ticket_number: claim.key.ticket_number,
                    reason: ReleaseReason::Expired.as_str().to_string(),
                    order_id: Some(order_id.to_string()),
                })
                .await;
        }
    }
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, test_ledger};

    #[tokio::test]
    async fn test_sweep_once_releases_expired() {
        let ledger = Arc::new(test_ledger(chrono::Duration::milliseconds(1)));
        ledger.try_claim(1, 10_050, fixtures::buyer()).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = ClaimSweeper::new(Arc::clone(&ledger), Duration::from_secs(60), None);
        let released = sweeper.sweep_once().await;

        assert_eq!(released.len(), 1);
        assert_eq!(ledger.active_claims(), 0);
    }

    #[tokio::test]
    async fn test_sweep_records_order_of_released_claim() {
        let ledger = Arc::new(test_ledger(chrono::Duration::milliseconds(1)));
        let claim = ledger.try_claim(1, 10_050, fixtures::buyer()).unwrap();
        ledger
            .attach_order(
                &claim.id,
                crate::checkout::Order {
                    order_id: claim.id.clone(),
                    scheme_id: 1,
                    ticket_number: 10_050,
                    amount: 5_000,
                    currency: "INR".to_string(),
                    gateway_order_id: "order_late".to_string(),
                    created_at: Utc::now(),
                },
            )
            .unwrap();
        ledger.try_claim(1, 10_051, fixtures::buyer()).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let sweeper = ClaimSweeper::new(
            Arc::clone(&ledger),
            Duration::from_secs(60),
            Some(AuditHandle::new(tx)),
        );
        assert_eq!(sweeper.sweep_once().await.len(), 2);
        drop(sweeper);

        let mut events = Vec::new();
        while let Some(envelope) = rx.recv().await {
            events.push(envelope.event);
        }
        assert!(matches!(events[0], AuditEvent::ClaimsExpired { count: 2, .. }));
        let released: Vec<&AuditEvent> = events
            .iter()
            .filter(|e| e.event_type() == "claim_released")
            .collect();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].order_id(), Some("order_late"));
    }

    #[tokio::test]
    async fn test_background_loop_start_stop() {
        let ledger = Arc::new(test_ledger(chrono::Duration::milliseconds(1)));
        ledger.try_claim(1, 10_050, fixtures::buyer()).unwrap();

        let sweeper = ClaimSweeper::new(Arc::clone(&ledger), Duration::from_millis(10), None);
        sweeper.start();
        assert!(sweeper.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ledger.active_claims(), 0);

        sweeper.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sweeper.is_running());
    }
}
