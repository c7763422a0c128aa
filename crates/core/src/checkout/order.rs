//! Order coordinator: claim a number, open a gateway order, track the hand-off.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::catalog::{SchemeCatalog, SchemeId};
use crate::gateway::{GatewayOrderRequest, OrderNotes, PaymentGateway, Prefill};
use crate::ledger::{Claim, LedgerError, ReleaseReason, ReservationLedger};
use crate::metrics::ORDERS_TOTAL;
use crate::profile::{validate_profile, BuyerProfile};

use super::{CheckoutError, CheckoutSession, Order};

pub struct OrderCoordinator {
    catalog: Arc<SchemeCatalog>,
    ledger: Arc<ReservationLedger>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    audit: Option<AuditHandle>,
}

impl OrderCoordinator {
    pub fn new(
        catalog: Arc<SchemeCatalog>,
        ledger: Arc<ReservationLedger>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            gateway,
            currency: currency.into(),
            audit,
        }
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.emit(event).await;
        }
    }

    /// Claim a number and open a gateway order for it.
    pub async fn start_checkout(
        &self,
        scheme_id: SchemeId,
        ticket_number: u32,
        buyer: BuyerProfile,
    ) -> Result<CheckoutSession, CheckoutError> {
        let claim = self
            .ledger
            .try_claim(scheme_id, ticket_number, buyer.normalized())
            .map_err(|e| {
                if matches!(e, LedgerError::InvalidProfile(_)) {
                    ORDERS_TOTAL.with_label_values(&["profile_invalid"]).inc();
                }
                CheckoutError::from(e)
            })?;

        self.emit(AuditEvent::ClaimCreated {
            claim_id: claim.id.clone(),
            scheme_id,
            ticket_number,
            mobile: claim.buyer.mobile.clone(),
            expires_at: claim.expires_at,
        })
        .await;

        self.create_order(&claim).await
    }

    /// Open a gateway order for a held claim.
    ///
    /// Any failure releases the claim so the number returns to the pool.
    pub async fn create_order(&self, claim: &Claim) -> Result<CheckoutSession, CheckoutError> {
        if claim.is_expired_at(Utc::now()) {
            self.release(claim, ReleaseReason::Expired).await;
            ORDERS_TOTAL.with_label_values(&["expired"]).inc();
            return Err(CheckoutError::ClaimExpired(claim.id.clone()));
        }

        if let Err(errors) = validate_profile(&claim.buyer) {
            self.release(claim, ReleaseReason::ProfileInvalid).await;
            ORDERS_TOTAL.with_label_values(&["profile_invalid"]).inc();
            return Err(CheckoutError::InvalidProfile(errors));
        }

        let scheme = self.catalog.get(claim.key.scheme_id)?;
        let request = GatewayOrderRequest {
            amount: scheme.unit_price_minor(),
            currency: self.currency.clone(),
            receipt: claim.id.clone(),
            notes: OrderNotes {
                full_name: claim.buyer.full_name.clone(),
                mobile: claim.buyer.mobile.clone(),
                scheme_id: scheme.id,
            },
        };
        let ticket_label = scheme.label.format(claim.key.ticket_number);

        let gateway_order = match self.gateway.create_order(&request).await {
            Ok(order) if order.amount == request.amount => order,
            Ok(order) => {
                let detail = format!(
                    "order {} amount {} does not match requested {}",
                    order.id, order.amount, request.amount
                );
                return Err(self.gateway_failed(claim, detail).await);
            }
            Err(e) => return Err(self.gateway_failed(claim, e.to_string()).await),
        };

        let order = Order {
            order_id: uuid::Uuid::new_v4().to_string(),
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            gateway_order_id: gateway_order.id,
            created_at: Utc::now(),
        };

        // The sweep may have evicted the claim while the gateway call was in flight.
        let claim = match self.ledger.attach_order(&claim.id, order.clone()) {
            Ok(claim) => claim,
            Err(LedgerError::ClaimNotFound(id)) => {
                warn!(
                    "Claim {} expired while gateway order {} was being created",
                    id, order.gateway_order_id
                );
                ORDERS_TOTAL.with_label_values(&["expired"]).inc();
                return Err(CheckoutError::ClaimExpired(id));
            }
            Err(e) => return Err(e.into()),
        };

        self.emit(AuditEvent::OrderCreated {
            claim_id: claim.id.clone(),
            order_id: order.gateway_order_id.clone(),
            scheme_id: order.scheme_id,
            ticket_number: order.ticket_number,
            amount: order.amount,
            currency: order.currency.clone(),
        })
        .await;
        ORDERS_TOTAL.with_label_values(&["created"]).inc();
        info!(
            "Order {} created for ticket {} (claim {})",
            order.gateway_order_id, claim.key, claim.id
        );

        Ok(CheckoutSession {
            claim_id: claim.id.clone(),
            key_id: self.gateway.key_id().to_string(),
            expires_at: claim.expires_at,
            description: format!("Ticket #{ticket_label}"),
            ticket_label,
            prefill: Prefill {
                name: claim.buyer.full_name.clone(),
                email: claim.buyer.email.clone(),
                contact: claim.buyer.mobile.clone(),
            },
            order,
        })
    }

    /// Record that the buyer widget was opened for an order.
    pub fn gateway_opened(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        let claim = self
            .ledger
            .claim_for_order(gateway_order_id)
            .ok_or_else(|| CheckoutError::OrderNotFound(gateway_order_id.to_string()))?;
        self.ledger.mark_gateway_open(&claim.id)?;
        debug!("Gateway opened for order {}", gateway_order_id);
        Ok(())
    }

    /// Buyer dismissed the widget: release the claim.
    pub async fn cancel(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        let claim = self
            .ledger
            .claim_for_order(gateway_order_id)
            .ok_or_else(|| CheckoutError::OrderNotFound(gateway_order_id.to_string()))?;

        let released = self
            .ledger
            .release(&claim.id, ReleaseReason::Cancelled)
            .map_err(|e| match e {
                LedgerError::ClaimNotFound(_) => {
                    CheckoutError::OrderNotFound(gateway_order_id.to_string())
                }
                LedgerError::InvalidTransition { .. } => {
                    CheckoutError::VerificationInProgress(gateway_order_id.to_string())
                }
                other => other.into(),
            })?;

        self.audit_release(&released, ReleaseReason::Cancelled).await;
        info!("Checkout for order {} cancelled", gateway_order_id);
        Ok(())
    }

    /// Live claim behind a gateway order.
    pub fn order_status(&self, gateway_order_id: &str) -> Option<Claim> {
        self.ledger.claim_for_order(gateway_order_id)
    }

    async fn gateway_failed(&self, claim: &Claim, detail: String) -> CheckoutError {
        warn!(
            "Gateway {} failed to create order for claim {}: {}",
            self.gateway.name(),
            claim.id,
            detail
        );
        ORDERS_TOTAL.with_label_values(&["gateway_failed"]).inc();
        self.emit(AuditEvent::GatewayFailed {
            claim_id: claim.id.clone(),
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
            gateway: self.gateway.name().to_string(),
            error: detail.clone(),
        })
        .await;
        self.release(claim, ReleaseReason::GatewayFailed).await;
        CheckoutError::GatewayUnavailable(detail)
    }

    async fn release(&self, claim: &Claim, reason: ReleaseReason) {
        match self.ledger.release(&claim.id, reason) {
            Ok(released) => self.audit_release(&released, reason).await,
            // Already gone (swept or released elsewhere).
            Err(LedgerError::ClaimNotFound(_)) => {}
            Err(e) => warn!("Failed to release claim {}: {}", claim.id, e),
        }
    }

    async fn audit_release(&self, claim: &Claim, reason: ReleaseReason) {
        self.emit(AuditEvent::ClaimReleased {
            claim_id: claim.id.clone(),
            scheme_id: claim.key.scheme_id,
            ticket_number: claim.key.ticket_number,
            reason: reason.as_str().to_string(),
            order_id: claim.gateway_order_id().map(String::from),
        })
        .await;
    }
}
