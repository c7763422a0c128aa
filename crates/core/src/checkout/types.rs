use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::SchemeId;
use crate::gateway::Prefill;
use crate::ticket::Ticket;

/// A payment order opened at the gateway for one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub scheme_id: SchemeId,
    pub ticket_number: u32,
    /// Amount in minor units (paise).
    pub amount: u64,
    pub currency: String,
    pub gateway_order_id: String,
    pub created_at: DateTime<Utc>,
}

/// Everything the buyer widget needs to take a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub claim_id: String,
    pub order: Order,
    /// Public gateway key the widget is opened with.
    pub key_id: String,
    pub expires_at: DateTime<Utc>,
    pub ticket_label: String,
    pub description: String,
    pub prefill: Prefill,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Ticket created by this callback.
    Finalized(Ticket),
    /// Callback was already processed; the existing ticket.
    Replayed(Ticket),
}

impl Verification {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Verification::Finalized(t) | Verification::Replayed(t) => t,
        }
    }

    pub fn into_ticket(self) -> Ticket {
        match self {
            Verification::Finalized(t) | Verification::Replayed(t) => t,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Verification::Replayed(_))
    }
}
