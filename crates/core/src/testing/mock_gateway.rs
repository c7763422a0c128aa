//! Mock payment gateway for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::gateway::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway};

/// Mock implementation of the `PaymentGateway` trait.
///
/// Provides controllable behavior for testing:
/// - Record order requests for assertions
/// - Fail the next N calls as if the gateway were down
/// - Echo back a different amount than requested
///
/// # Example
///
/// ```rust,ignore
/// use ticketline_core::testing::MockGateway;
///
/// let gateway = MockGateway::new();
/// gateway.fail_next(1);
///
/// // first create_order fails, the next succeeds
/// let requests = gateway.requests();
/// ```
#[derive(Debug, Default)]
pub struct MockGateway {
    requests: Mutex<Vec<GatewayOrderRequest>>,
    failures_left: AtomicUsize,
    amount_override: Mutex<Option<u64>>,
    counter: AtomicUsize,
}

impl MockGateway {
    pub const KEY_ID: &'static str = "rzp_test_mock";

    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` order creations with a connection error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Report this amount on created orders instead of the requested one.
    pub fn override_amount(&self, amount: Option<u64>) {
        *self
            .amount_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = amount;
    }

    /// Every request received so far, including failed ones.
    pub fn requests(&self) -> Vec<GatewayOrderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn key_id(&self) -> &str {
        Self::KEY_ID
    }

    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GatewayError::ConnectionFailed(
                "mock gateway unavailable".to_string(),
            ));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let amount = self
            .amount_override
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(request.amount);

        Ok(GatewayOrder {
            id: format!("order_mock_{n}"),
            amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".to_string()),
        })
    }
}
