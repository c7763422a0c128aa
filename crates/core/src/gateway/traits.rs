use async_trait::async_trait;

use super::{GatewayError, GatewayOrder, GatewayOrderRequest, WidgetOutcome};
use crate::checkout::CheckoutSession;

/// Server-side half of a payment gateway: order creation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Public key id the buyer widget is opened with.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &GatewayOrderRequest)
        -> Result<GatewayOrder, GatewayError>;
}

/// Buyer-side half of a payment gateway: the interactive payment widget.
///
/// Opening the widget suspends until the buyer pays or dismisses it.
#[async_trait]
pub trait GatewayWidget: Send + Sync {
    async fn open(&self, session: &CheckoutSession) -> WidgetOutcome;
}
