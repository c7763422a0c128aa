use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::SchemeId;
use crate::ledger::TicketKey;
use crate::profile::BuyerProfile;

/// Path the buyer downloads a ticket receipt from.
pub fn download_ref(ticket_id: &str) -> String {
    format!("/api/v1/tickets/{ticket_id}/download")
}

/// A finalized, paid ticket. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub scheme_id: SchemeId,
    pub ticket_number: u32,
    pub buyer: BuyerProfile,
    /// Amount paid in major currency units.
    pub amount_paid: u32,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
    pub purchase_date: DateTime<Utc>,
    pub download_ref: String,
}

impl Ticket {
    pub fn key(&self) -> TicketKey {
        TicketKey::new(self.scheme_id, self.ticket_number)
    }
}

/// Everything needed to persist a ticket; id and purchase date are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub scheme_id: SchemeId,
    pub ticket_number: u32,
    pub buyer: BuyerProfile,
    pub amount_paid: u32,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}
