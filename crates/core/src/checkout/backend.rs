use async_trait::async_trait;

use super::wire::{CreateOrderRequest, OrderStatusResponse, VerifyPaymentRequest};
use super::{CheckoutError, CheckoutSession, Verification, VerifyError};

/// Server operations the checkout controller drives.
///
/// Implemented in-process by [`super::CheckoutService`] and over HTTP by
/// [`super::HttpCheckoutBackend`].
#[async_trait]
pub trait CheckoutBackend: Send + Sync {
    async fn create_order(&self, request: CreateOrderRequest)
        -> Result<CheckoutSession, CheckoutError>;

    async fn gateway_opened(&self, gateway_order_id: &str) -> Result<(), CheckoutError>;

    async fn cancel(&self, gateway_order_id: &str) -> Result<(), CheckoutError>;

    /// Live claim behind an order, or `None` once it is gone.
    async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderStatusResponse>, CheckoutError>;

    async fn verify(&self, request: VerifyPaymentRequest) -> Result<Verification, VerifyError>;
}
