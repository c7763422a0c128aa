//! Payment gateway seam: order creation, buyer widget and callback signatures.

mod local;
mod razorpay;
mod signature;
mod traits;
mod types;

use std::sync::Arc;

pub use local::LocalGateway;
pub use razorpay::RazorpayGateway;
pub use signature::PaymentSigner;
pub use traits::{GatewayWidget, PaymentGateway};
pub use types::*;

use crate::config::{GatewayBackend, GatewayConfig};

/// Build the gateway selected in config.
pub fn create_gateway(config: &GatewayConfig) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
    match config.backend {
        GatewayBackend::Razorpay => Ok(Arc::new(RazorpayGateway::new(config)?)),
        GatewayBackend::Mock => Ok(Arc::new(LocalGateway::new(
            config.key_id.clone(),
            &config.key_secret,
        )?)),
    }
}
