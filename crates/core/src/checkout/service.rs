use async_trait::async_trait;

use super::backend::CheckoutBackend;
use super::wire::{CreateOrderRequest, OrderStatusResponse, VerifyPaymentRequest};
use super::{CheckoutError, CheckoutSession, OrderCoordinator, PaymentVerifier, Verification, VerifyError};

/// In-process checkout backend: the coordinator and verifier behind one facade.
///
/// The HTTP handlers call into this, and so does a controller running in the
/// same process as the server.
pub struct CheckoutService {
    coordinator: OrderCoordinator,
    verifier: PaymentVerifier,
}

impl CheckoutService {
    pub fn new(coordinator: OrderCoordinator, verifier: PaymentVerifier) -> Self {
        Self {
            coordinator,
            verifier,
        }
    }

    pub fn coordinator(&self) -> &OrderCoordinator {
        &self.coordinator
    }

    pub fn verifier(&self) -> &PaymentVerifier {
        &self.verifier
    }
}

#[async_trait]
impl CheckoutBackend for CheckoutService {
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        self.coordinator
            .start_checkout(request.scheme_id, request.ticket_number, request.buyer_profile)
            .await
    }

    async fn gateway_opened(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        self.coordinator.gateway_opened(gateway_order_id)
    }

    async fn cancel(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        self.coordinator.cancel(gateway_order_id).await
    }

    async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderStatusResponse>, CheckoutError> {
        Ok(self
            .coordinator
            .order_status(gateway_order_id)
            .map(|claim| OrderStatusResponse {
                gateway_order_id: gateway_order_id.to_string(),
                claim_id: claim.id,
                state: claim.state,
                expires_at: claim.expires_at,
            }))
    }

    async fn verify(&self, request: VerifyPaymentRequest) -> Result<Verification, VerifyError> {
        self.verifier.verify(request).await
    }
}
