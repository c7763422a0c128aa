use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::SchemeId;

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Claim lifecycle
    ClaimCreated {
        claim_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        mobile: String,
        expires_at: DateTime<Utc>,
    },
    ClaimReleased {
        claim_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        /// Release reason, e.g. "cancelled", "gateway_failed"
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_id: Option<String>,
    },
    /// Periodic sweep released claims whose TTL elapsed.
    ClaimsExpired {
        count: usize,
        claim_ids: Vec<String>,
    },

    // Orders
    OrderCreated {
        claim_id: String,
        /// Gateway order id
        order_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        /// Amount in minor units
        amount: u64,
        currency: String,
    },
    GatewayFailed {
        claim_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        gateway: String,
        error: String,
    },

    // Payments
    TicketFinalized {
        ticket_id: String,
        order_id: String,
        payment_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        amount_paid: u32,
    },
    SignatureRejected {
        order_id: String,
        payment_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
    },
    /// Payment verified but the number could not be sold. Needs reconciliation.
    SaleConflict {
        order_id: String,
        payment_id: String,
        scheme_id: SchemeId,
        ticket_number: u32,
        detail: String,
    },
    /// Correctly signed payment for an order with no live claim and no ticket.
    /// The buyer was charged; the payment needs a refund.
    OrphanedPayment {
        order_id: String,
        payment_id: String,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::ClaimCreated { .. } => "claim_created",
            Self::ClaimReleased { .. } => "claim_released",
            Self::ClaimsExpired { .. } => "claims_expired",
            Self::OrderCreated { .. } => "order_created",
            Self::GatewayFailed { .. } => "gateway_failed",
            Self::TicketFinalized { .. } => "ticket_finalized",
            Self::SignatureRejected { .. } => "signature_rejected",
            Self::SaleConflict { .. } => "sale_conflict",
            Self::OrphanedPayment { .. } => "orphaned_payment",
        }
    }

    /// Extract the gateway order id if this event concerns an order
    pub fn order_id(&self) -> Option<&str> {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::TicketFinalized { order_id, .. }
            | Self::SignatureRejected { order_id, .. }
            | Self::SaleConflict { order_id, .. }
            | Self::OrphanedPayment { order_id, .. } => Some(order_id),
            Self::ClaimReleased { order_id, .. } => order_id.as_deref(),
            _ => None,
        }
    }

    /// Extract the scheme id if this event concerns a ticket number
    pub fn scheme_id(&self) -> Option<SchemeId> {
        match self {
            Self::ClaimCreated { scheme_id, .. }
            | Self::ClaimReleased { scheme_id, .. }
            | Self::OrderCreated { scheme_id, .. }
            | Self::GatewayFailed { scheme_id, .. }
            | Self::TicketFinalized { scheme_id, .. }
            | Self::SignatureRejected { scheme_id, .. }
            | Self::SaleConflict { scheme_id, .. } => Some(*scheme_id),
            _ => None,
        }
    }
}

/// Stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub order_id: Option<String>,
    pub scheme_id: Option<SchemeId>,
    pub data: AuditEvent,
}
