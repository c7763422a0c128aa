//! Mock buyer payment widget for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::checkout::CheckoutSession;
use crate::gateway::{GatewayCallback, GatewayWidget, PaymentSigner, WidgetOutcome};

/// What the buyer does the next time the widget opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetScript {
    /// Pay and return a correctly signed callback.
    Pay,
    /// Close the widget without paying.
    Dismiss,
    /// Return a callback with a garbage signature.
    Forge,
}

/// Mock implementation of the `GatewayWidget` trait.
///
/// Plays back a queue of [`WidgetScript`] steps; once the queue is empty it
/// repeats the fallback step. Callbacks are signed with the secret it was
/// built with, so a widget built with the wrong secret behaves like a forger.
pub struct MockWidget {
    signer: PaymentSigner,
    script: Mutex<VecDeque<WidgetScript>>,
    fallback: WidgetScript,
    opened: Mutex<Vec<CheckoutSession>>,
    payments: AtomicUsize,
}

impl MockWidget {
    fn build(secret: &str, script: Vec<WidgetScript>, fallback: WidgetScript) -> Self {
        Self {
            signer: PaymentSigner::new(secret).expect("widget secret"),
            script: Mutex::new(script.into()),
            fallback,
            opened: Mutex::new(Vec::new()),
            payments: AtomicUsize::new(0),
        }
    }

    /// Buyer always pays.
    pub fn paying(secret: &str) -> Self {
        Self::build(secret, Vec::new(), WidgetScript::Pay)
    }

    /// Buyer always closes the widget.
    pub fn dismissing() -> Self {
        Self::build("unused", Vec::new(), WidgetScript::Dismiss)
    }

    /// Play `script` in order, then keep paying.
    pub fn scripted(secret: &str, script: Vec<WidgetScript>) -> Self {
        Self::build(secret, script, WidgetScript::Pay)
    }

    /// Sessions the widget was opened with, oldest first.
    pub fn opened(&self) -> Vec<CheckoutSession> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_step(&self) -> WidgetScript {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl GatewayWidget for MockWidget {
    async fn open(&self, session: &CheckoutSession) -> WidgetOutcome {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session.clone());

        let order_id = session.order.gateway_order_id.clone();
        let n = self.payments.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_id = format!("pay_mock_{n}");

        match self.next_step() {
            WidgetScript::Dismiss => WidgetOutcome::Dismissed,
            WidgetScript::Pay => WidgetOutcome::Completed(GatewayCallback {
                gateway_signature: self.signer.sign(&order_id, &payment_id),
                gateway_order_id: order_id,
                gateway_payment_id: payment_id,
            }),
            WidgetScript::Forge => WidgetOutcome::Completed(GatewayCallback {
                gateway_signature: "0".repeat(64),
                gateway_order_id: order_id,
                gateway_payment_id: payment_id,
            }),
        }
    }
}
