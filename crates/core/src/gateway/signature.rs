//! Callback signature scheme: `hex(HMAC-SHA256(secret, "{order_id}|{payment_id}"))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::GatewayError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and checks gateway payment callbacks.
#[derive(Clone)]
pub struct PaymentSigner {
    keyed: HmacSha256,
}

impl std::fmt::Debug for PaymentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSigner").finish_non_exhaustive()
    }
}

impl PaymentSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, GatewayError> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|_| GatewayError::Configuration("failed to initialize hmac".to_string()))?;
        Ok(Self { keyed })
    }

    fn mac(&self, order_id: &str, payment_id: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        mac
    }

    /// Lower-case hex signature for a payment.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> String {
        hex::encode(self.mac(order_id, payment_id).finalize().into_bytes())
    }

    /// Constant-time check of a hex signature. Malformed hex never matches.
    pub fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(order_id, payment_id)
            .verify_slice(&provided)
            .is_ok()
    }
}
