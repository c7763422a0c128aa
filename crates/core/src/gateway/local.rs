//! Self-contained gateway used with `backend = "mock"`.
//!
//! Orders are minted in-process and payments can be simulated with
//! [`LocalGateway::simulate_payment`], which signs the callback with the same
//! secret the verifier checks against.

use async_trait::async_trait;

use super::{
    GatewayCallback, GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway,
    PaymentSigner,
};

pub struct LocalGateway {
    key_id: String,
    signer: PaymentSigner,
}

impl LocalGateway {
    pub fn new(key_id: impl Into<String>, key_secret: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            key_id: key_id.into(),
            signer: PaymentSigner::new(key_secret)?,
        })
    }

    /// Produce a correctly signed callback for an order, as if the buyer paid.
    pub fn simulate_payment(&self, gateway_order_id: &str) -> GatewayCallback {
        let payment_id = format!("pay_{}", &uuid::Uuid::new_v4().simple().to_string()[..14]);
        GatewayCallback {
            gateway_signature: self.signer.sign(gateway_order_id, &payment_id),
            gateway_order_id: gateway_order_id.to_string(),
            gateway_payment_id: payment_id,
        }
    }
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    fn name(&self) -> &'static str {
        "local"
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        Ok(GatewayOrder {
            id: format!("order_{}", &uuid::Uuid::new_v4().simple().to_string()[..14]),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
        })
    }
}
