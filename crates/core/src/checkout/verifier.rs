//! Payment verification: signature check, atomic finalize, ticket persistence.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::catalog::SchemeCatalog;
use crate::gateway::PaymentSigner;
use crate::ledger::{Claim, LedgerError, ReleaseReason, ReservationLedger, TicketKey};
use crate::metrics::{TICKETS_SOLD, VERIFICATIONS_TOTAL};
use crate::ticket::{NewTicket, TicketError, TicketStore};

use super::wire::VerifyPaymentRequest;
use super::{Verification, VerifyError};

pub struct PaymentVerifier {
    catalog: Arc<SchemeCatalog>,
    ledger: Arc<ReservationLedger>,
    store: Arc<dyn TicketStore>,
    signer: PaymentSigner,
    audit: Option<AuditHandle>,
}

impl PaymentVerifier {
    pub fn new(
        catalog: Arc<SchemeCatalog>,
        ledger: Arc<ReservationLedger>,
        store: Arc<dyn TicketStore>,
        signer: PaymentSigner,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            store,
            signer,
            audit,
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    /// Verify a payment callback and, on success, persist the ticket.
    ///
    /// A callback for an order that already produced a ticket returns that
    /// ticket instead of creating a second one.
    pub async fn verify(&self, request: VerifyPaymentRequest) -> Result<Verification, VerifyError> {
        let result = self.verify_inner(&request).await;
        let outcome = match &result {
            Ok(Verification::Finalized(_)) => "finalized",
            Ok(Verification::Replayed(_)) => "replayed",
            Err(e) => e.code(),
        };
        VERIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn verify_inner(&self, request: &VerifyPaymentRequest) -> Result<Verification, VerifyError> {
        let order_id = request.gateway_order_id.as_str();

        let Some(claim) = self.ledger.claim_for_order(order_id) else {
            return self.replay(request).await;
        };

        // Claim details are only compared against signed callbacks.
        let signed = self.signature_valid(request);
        if signed {
            let requested = TicketKey::new(request.scheme_id, request.ticket_number);
            if claim.key != requested {
                warn!(
                    "Callback for order {} names ticket {} but the claim holds {}",
                    order_id, requested, claim.key
                );
                return Err(VerifyError::ProfileMismatch {
                    field: "ticketNumber",
                });
            }
            if claim.buyer.mobile != request.buyer_profile.mobile {
                warn!("Callback for order {} carries a different mobile", order_id);
                return Err(VerifyError::ProfileMismatch { field: "mobile" });
            }
        }

        let claim = match self.ledger.begin_verification(&claim.id) {
            Ok(claim) => claim,
            // Finalized by a concurrent callback between lookup and here.
            Err(LedgerError::ClaimNotFound(_)) => return self.replay(request).await,
            Err(LedgerError::InvalidTransition { .. }) if !signed => {
                warn!("Unsigned callback for order {} while it is being verified", order_id);
                return Err(VerifyError::SignatureInvalid);
            }
            Err(LedgerError::InvalidTransition { .. }) => {
                return Err(VerifyError::InProgress(order_id.to_string()))
            }
            Err(e) => return Err(VerifyError::Storage(e.to_string())),
        };

        if !signed {
            return Err(self.signature_rejected(&claim, request).await);
        }

        let claim = match self.ledger.finalize(&claim.id) {
            Ok(claim) => claim,
            Err(LedgerError::AlreadySold(key)) => {
                return Err(self
                    .sale_conflict(&claim, request, key, "number already sold in ledger")
                    .await)
            }
            Err(e) => return Err(VerifyError::Storage(e.to_string())),
        };

        self.persist(claim, request).await
    }

    fn signature_valid(&self, request: &VerifyPaymentRequest) -> bool {
        self.signer.verify(
            &request.gateway_order_id,
            &request.gateway_payment_id,
            &request.gateway_signature,
        )
    }

    async fn persist(
        &self,
        claim: Claim,
        request: &VerifyPaymentRequest,
    ) -> Result<Verification, VerifyError> {
        let amount_paid = match self.catalog.get(claim.key.scheme_id) {
            Ok(scheme) => scheme.unit_price,
            Err(e) => return Err(self.revert(claim, e.to_string())),
        };

        let new_ticket = NewTicket {
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
            buyer: claim.buyer.clone(),
            amount_paid,
            gateway_order_id: request.gateway_order_id.clone(),
            gateway_payment_id: request.gateway_payment_id.clone(),
            gateway_signature: request.gateway_signature.clone(),
        };

        match self.store.create(new_ticket) {
            Ok(ticket) => {
                TICKETS_SOLD.inc();
                info!(
                    "Ticket {} issued for {} (order {}, payment {})",
                    ticket.id, claim.key, ticket.gateway_order_id, ticket.gateway_payment_id
                );
                self.emit(AuditEvent::TicketFinalized {
                    ticket_id: ticket.id.clone(),
                    order_id: ticket.gateway_order_id.clone(),
                    payment_id: ticket.gateway_payment_id.clone(),
                    scheme_id: ticket.scheme_id,
                    ticket_number: ticket.ticket_number,
                    amount_paid: ticket.amount_paid,
                })
                .await;
                Ok(Verification::Finalized(ticket))
            }
            Err(TicketError::DuplicateTicketNumber(key)) => {
                // Durable store disagrees with the ledger: someone else owns the number.
                error!(
                    "Ticket {} already persisted for another order; payment {} needs a refund",
                    key, request.gateway_payment_id
                );
                self.emit(AuditEvent::SaleConflict {
                    order_id: request.gateway_order_id.clone(),
                    payment_id: request.gateway_payment_id.clone(),
                    scheme_id: key.scheme_id,
                    ticket_number: key.ticket_number,
                    detail: "number already persisted".to_string(),
                })
                .await;
                Err(VerifyError::AlreadySold(key))
            }
            Err(TicketError::DuplicateOrder(_)) => self.replay(request).await,
            Err(e) => Err(self.revert(claim, e.to_string())),
        }
    }

    /// Answer a callback whose claim is gone from the ledger.
    async fn replay(&self, request: &VerifyPaymentRequest) -> Result<Verification, VerifyError> {
        let order_id = request.gateway_order_id.as_str();
        let signed = self.signature_valid(request);
        let existing = self
            .store
            .find_by_gateway_order(order_id)
            .map_err(|e| VerifyError::Storage(e.to_string()))?;

        let Some(ticket) = existing else {
            if signed {
                return Err(self.orphaned_payment(request).await);
            }
            warn!("Unsigned callback for unknown order {}", order_id);
            return Err(VerifyError::UnknownOrder(order_id.to_string()));
        };

        if !signed {
            warn!("Replayed callback for order {} has a bad signature", order_id);
            return Err(VerifyError::SignatureInvalid);
        }
        if ticket.gateway_payment_id != request.gateway_payment_id {
            error!(
                "Order {} already paid by {}; second payment {} needs a refund",
                order_id, ticket.gateway_payment_id, request.gateway_payment_id
            );
            return Err(VerifyError::AlreadySold(ticket.key()));
        }

        info!("Callback for order {} replayed; returning ticket {}", order_id, ticket.id);
        Ok(Verification::Replayed(ticket))
    }

    /// Signed payment for an order whose claim expired or never existed here.
    async fn orphaned_payment(&self, request: &VerifyPaymentRequest) -> VerifyError {
        error!(
            "Payment {} for order {} has no live claim and no ticket; needs a refund",
            request.gateway_payment_id, request.gateway_order_id
        );
        self.emit(AuditEvent::OrphanedPayment {
            order_id: request.gateway_order_id.clone(),
            payment_id: request.gateway_payment_id.clone(),
        })
        .await;
        VerifyError::UnknownOrder(request.gateway_order_id.clone())
    }

    async fn signature_rejected(&self, claim: &Claim, request: &VerifyPaymentRequest) -> VerifyError {
        warn!(
            "Signature mismatch for order {} (payment {}); releasing {}",
            request.gateway_order_id, request.gateway_payment_id, claim.key
        );
        if let Err(e) = self.ledger.reject(&claim.id, ReleaseReason::SignatureRejected) {
            warn!("Failed to reject claim {}: {}", claim.id, e);
        }
        self.emit(AuditEvent::SignatureRejected {
            order_id: request.gateway_order_id.clone(),
            payment_id: request.gateway_payment_id.clone(),
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
        })
        .await;
        VerifyError::SignatureInvalid
    }

    async fn sale_conflict(
        &self,
        claim: &Claim,
        request: &VerifyPaymentRequest,
        key: TicketKey,
        detail: &str,
    ) -> VerifyError {
        error!(
            "Paid order {} lost {}: {}; payment {} needs a refund",
            request.gateway_order_id, key, detail, request.gateway_payment_id
        );
        if let Err(e) = self.ledger.reject(&claim.id, ReleaseReason::Conflict) {
            warn!("Failed to reject claim {}: {}", claim.id, e);
        }
        self.emit(AuditEvent::SaleConflict {
            order_id: request.gateway_order_id.clone(),
            payment_id: request.gateway_payment_id.clone(),
            scheme_id: key.scheme_id,
            ticket_number: key.ticket_number,
            detail: detail.to_string(),
        })
        .await;
        VerifyError::AlreadySold(key)
    }

    /// Put a finalized claim back so a redelivered callback can retry.
    fn revert(&self, claim: Claim, detail: String) -> VerifyError {
        error!(
            "Failed to persist ticket {} for order {:?}: {}",
            claim.key,
            claim.gateway_order_id(),
            detail
        );
        let claim_id = claim.id.clone();
        if let Err(e) = self.ledger.revert_sale(claim) {
            error!("Could not reinstate claim {}: {}", claim_id, e);
        }
        VerifyError::Storage(detail)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::checkout::Order;
    use crate::ledger::ClaimState;
    use crate::testing::{fixtures, test_catalog, test_ledger};
    use crate::ticket::{SqliteTicketStore, Ticket, TicketFilter};

    const SECRET: &str = "test_secret";

    struct Harness {
        ledger: Arc<ReservationLedger>,
        store: Arc<SqliteTicketStore>,
        verifier: PaymentVerifier,
        signer: PaymentSigner,
    }

    fn harness() -> Harness {
        harness_with_audit(None)
    }

    fn harness_with_audit(audit: Option<AuditHandle>) -> Harness {
        let ledger = Arc::new(test_ledger(chrono::Duration::minutes(15)));
        let store = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let verifier = PaymentVerifier::new(
            test_catalog(),
            Arc::clone(&ledger),
            Arc::clone(&store) as Arc<dyn TicketStore>,
            PaymentSigner::new(SECRET).unwrap(),
            audit,
        );
        Harness {
            ledger,
            store,
            verifier,
            signer: PaymentSigner::new(SECRET).unwrap(),
        }
    }

    /// Claim a number and attach a gateway order to it.
    fn open_order(ledger: &ReservationLedger, number: u32, order_id: &str) -> Claim {
        let claim = ledger.try_claim(1, number, fixtures::buyer()).unwrap();
        let order = Order {
            order_id: claim.id.clone(),
            scheme_id: 1,
            ticket_number: number,
            amount: 5_000,
            currency: "INR".to_string(),
            gateway_order_id: order_id.to_string(),
            created_at: chrono::Utc::now(),
        };
        ledger.attach_order(&claim.id, order).unwrap();
        ledger.mark_gateway_open(&claim.id).unwrap()
    }

    fn signed_request(h: &Harness, number: u32, order_id: &str, payment_id: &str) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            gateway_order_id: order_id.to_string(),
            gateway_payment_id: payment_id.to_string(),
            gateway_signature: h.signer.sign(order_id, payment_id),
            ticket_number: number,
            scheme_id: 1,
            buyer_profile: fixtures::buyer(),
        }
    }

    #[tokio::test]
    async fn test_valid_callback_issues_ticket() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");

        let result = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await
            .unwrap();

        assert!(!result.is_replay());
        let ticket = result.ticket();
        assert_eq!(ticket.ticket_number, 10_050);
        assert_eq!(ticket.amount_paid, 50);
        assert_eq!(ticket.gateway_payment_id, "pay_1");
        assert!(h.ledger.is_sold(&TicketKey::new(1, 10_050)));
        assert_eq!(h.ledger.active_claims(), 0);
        assert_eq!(h.store.count(&TicketFilter::new()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejects_and_frees_number() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");

        let mut request = signed_request(&h, 10_050, "order_1", "pay_1");
        request.gateway_signature = "0".repeat(64);

        let result = h.verifier.verify(request).await;
        assert!(matches!(result, Err(VerifyError::SignatureInvalid)));
        assert!(!h.ledger.is_sold(&TicketKey::new(1, 10_050)));
        assert_eq!(h.store.count(&TicketFilter::new()).unwrap(), 0);

        // Number can be claimed again.
        assert!(h.ledger.try_claim(1, 10_050, fixtures::buyer()).is_ok());
    }

    #[tokio::test]
    async fn test_replayed_callback_returns_same_ticket() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");

        let first = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await
            .unwrap();
        let second = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await
            .unwrap();

        assert!(second.is_replay());
        assert_eq!(first.ticket().id, second.ticket().id);
        assert_eq!(h.store.count(&TicketFilter::new()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replay_with_bad_signature_is_rejected() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");
        h.verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await
            .unwrap();

        let mut forged = signed_request(&h, 10_050, "order_1", "pay_1");
        forged.gateway_signature = "deadbeef".to_string();
        assert!(matches!(
            h.verifier.verify(forged).await,
            Err(VerifyError::SignatureInvalid)
        ));
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let h = harness();
        let result = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_missing", "pay_1"))
            .await;
        assert!(matches!(result, Err(VerifyError::UnknownOrder(_))));
    }

    #[tokio::test]
    async fn test_mismatched_ticket_number_and_mobile() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");

        let wrong_number = signed_request(&h, 10_051, "order_1", "pay_1");
        assert!(matches!(
            h.verifier.verify(wrong_number).await,
            Err(VerifyError::ProfileMismatch {
                field: "ticketNumber"
            })
        ));

        let mut wrong_mobile = signed_request(&h, 10_050, "order_1", "pay_1");
        wrong_mobile.buyer_profile = fixtures::other_buyer();
        assert!(matches!(
            h.verifier.verify(wrong_mobile).await,
            Err(VerifyError::ProfileMismatch { field: "mobile" })
        ));

        // Claim untouched by the mismatches.
        let claim = h.ledger.claim_for_order("order_1").unwrap();
        assert_eq!(claim.state, ClaimState::AwaitingGateway);
    }

    #[tokio::test]
    async fn test_unsigned_mismatch_reveals_nothing() {
        let h = harness();
        open_order(&h.ledger, 10_050, "order_1");

        let mut forged = signed_request(&h, 10_051, "order_1", "pay_1");
        forged.buyer_profile = fixtures::other_buyer();
        forged.gateway_signature = "0".repeat(64);

        assert!(matches!(
            h.verifier.verify(forged).await,
            Err(VerifyError::SignatureInvalid)
        ));
        assert!(h.ledger.claim_for_order("order_1").is_none());
    }

    #[tokio::test]
    async fn test_signed_payment_after_expiry_is_audited() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let h = harness_with_audit(Some(AuditHandle::new(tx)));
        let claim = open_order(&h.ledger, 10_050, "order_1");
        h.ledger
            .release(&claim.id, ReleaseReason::Expired)
            .unwrap();

        let result = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await;
        assert!(matches!(result, Err(VerifyError::UnknownOrder(_))));

        let envelope = rx.try_recv().unwrap();
        match envelope.event {
            AuditEvent::OrphanedPayment {
                order_id,
                payment_id,
            } => {
                assert_eq!(order_id, "order_1");
                assert_eq!(payment_id, "pay_1");
            }
            other => panic!("unexpected event {other:?}"),
        }

        // An unsigned callback for the same order leaves no trace.
        let mut forged = signed_request(&h, 10_050, "order_1", "pay_2");
        forged.gateway_signature = "deadbeef".to_string();
        assert!(matches!(
            h.verifier.verify(forged).await,
            Err(VerifyError::UnknownOrder(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_verification_reports_in_progress() {
        let h = harness();
        let claim = open_order(&h.ledger, 10_050, "order_1");
        h.ledger.begin_verification(&claim.id).unwrap();

        let result = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await;
        assert!(matches!(result, Err(VerifyError::InProgress(_))));
        assert!(result.unwrap_err().is_retryable());
    }

    /// Store whose writes fail until switched back on.
    struct FlakyStore {
        inner: SqliteTicketStore,
        failing: AtomicBool,
    }

    impl TicketStore for FlakyStore {
        fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TicketError::Database("disk I/O error".to_string()));
            }
            self.inner.create(ticket)
        }
        fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
            self.inner.get(id)
        }
        fn find_by_gateway_order(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
            self.inner.find_by_gateway_order(id)
        }
        fn list_by_mobile(&self, mobile: &str) -> Result<Vec<Ticket>, TicketError> {
            self.inner.list_by_mobile(mobile)
        }
        fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
            self.inner.list(filter)
        }
        fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
            self.inner.count(filter)
        }
        fn sold_numbers(&self, scheme_id: u32) -> Result<Vec<u32>, TicketError> {
            self.inner.sold_numbers(scheme_id)
        }
        fn recent(&self, limit: usize) -> Result<Vec<Ticket>, TicketError> {
            self.inner.recent(limit)
        }
        fn sold_keys(&self) -> Result<Vec<TicketKey>, TicketError> {
            self.inner.sold_keys()
        }
    }

    #[tokio::test]
    async fn test_storage_failure_reinstates_claim_for_retry() {
        let ledger = Arc::new(test_ledger(chrono::Duration::minutes(15)));
        let store = Arc::new(FlakyStore {
            inner: SqliteTicketStore::in_memory().unwrap(),
            failing: AtomicBool::new(true),
        });
        let signer = PaymentSigner::new(SECRET).unwrap();
        let verifier = PaymentVerifier::new(
            test_catalog(),
            Arc::clone(&ledger),
            Arc::clone(&store) as Arc<dyn TicketStore>,
            PaymentSigner::new(SECRET).unwrap(),
            None,
        );
        open_order(&ledger, 10_050, "order_1");

        let request = VerifyPaymentRequest {
            gateway_order_id: "order_1".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            gateway_signature: signer.sign("order_1", "pay_1"),
            ticket_number: 10_050,
            scheme_id: 1,
            buyer_profile: fixtures::buyer(),
        };

        let failed = verifier.verify(request.clone()).await;
        assert!(matches!(failed, Err(VerifyError::Storage(_))));
        assert!(!ledger.is_sold(&TicketKey::new(1, 10_050)));
        let claim = ledger.claim_for_order("order_1").unwrap();
        assert_eq!(claim.state, ClaimState::AwaitingGateway);

        store.failing.store(false, Ordering::SeqCst);
        let retried = verifier.verify(request).await.unwrap();
        assert!(!retried.is_replay());
        assert!(ledger.is_sold(&TicketKey::new(1, 10_050)));
    }

    #[tokio::test]
    async fn test_persisted_number_conflict_reports_already_sold() {
        let h = harness();
        // Someone else's ticket is already on disk but the ledger was not seeded.
        h.store
            .create(NewTicket {
                scheme_id: 1,
                ticket_number: 10_050,
                buyer: fixtures::other_buyer(),
                amount_paid: 50,
                gateway_order_id: "order_other".to_string(),
                gateway_payment_id: "pay_other".to_string(),
                gateway_signature: "sig".to_string(),
            })
            .unwrap();
        open_order(&h.ledger, 10_050, "order_1");

        let result = h
            .verifier
            .verify(signed_request(&h, 10_050, "order_1", "pay_1"))
            .await;
        assert!(matches!(result, Err(VerifyError::AlreadySold(_))));
    }
}
