//! Claim types held by the reservation ledger.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, SchemeId};
use crate::checkout::Order;
use crate::profile::{BuyerProfile, ProfileErrors};

/// A `(scheme, ticket number)` pair; the unit of exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketKey {
    pub scheme_id: SchemeId,
    pub ticket_number: u32,
}

impl TicketKey {
    pub fn new(scheme_id: SchemeId, ticket_number: u32) -> Self {
        Self {
            scheme_id,
            ticket_number,
        }
    }
}

impl fmt::Display for TicketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scheme_id, self.ticket_number)
    }
}

/// Claim lifecycle.
///
/// ```text
/// Claimed -> OrderCreated -> AwaitingGateway -> Verifying -> Finalized
///    \            \               \                \-> Rejected
///     `------------`---------------`-> Released
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Claimed,
    OrderCreated,
    AwaitingGateway,
    Verifying,
    Finalized,
    Released,
    Rejected,
}

impl ClaimState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClaimState::Finalized | ClaimState::Released | ClaimState::Rejected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimState::Claimed => "claimed",
            ClaimState::OrderCreated => "order_created",
            ClaimState::AwaitingGateway => "awaiting_gateway",
            ClaimState::Verifying => "verifying",
            ClaimState::Finalized => "finalized",
            ClaimState::Released => "released",
            ClaimState::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a claim left the ledger without becoming a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// Buyer dismissed the gateway widget.
    Cancelled,
    /// TTL elapsed before payment completed.
    Expired,
    /// Order could not be created at the gateway.
    GatewayFailed,
    /// Profile failed the server-side gate.
    ProfileInvalid,
    /// Callback signature did not match.
    SignatureRejected,
    /// The number turned out to be sold already.
    Conflict,
}

impl ReleaseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseReason::Cancelled => "cancelled",
            ReleaseReason::Expired => "expired",
            ReleaseReason::GatewayFailed => "gateway_failed",
            ReleaseReason::ProfileInvalid => "profile_invalid",
            ReleaseReason::SignatureRejected => "signature_rejected",
            ReleaseReason::Conflict => "conflict",
        }
    }

    /// Terminal state a claim lands in for this reason.
    pub fn terminal_state(self) -> ClaimState {
        match self {
            ReleaseReason::SignatureRejected | ReleaseReason::Conflict => ClaimState::Rejected,
            _ => ClaimState::Released,
        }
    }
}

/// A temporary, exclusive hold on one ticket number during checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub key: TicketKey,
    pub buyer: BuyerProfile,
    pub state: ClaimState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set once the gateway order exists.
    pub order: Option<Order>,
}

impl Claim {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn gateway_order_id(&self) -> Option<&str> {
        self.order.as_ref().map(|o| o.gateway_order_id.as_str())
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ticket {0} is already claimed")]
    AlreadyClaimed(TicketKey),

    #[error("Ticket {0} is already sold")]
    AlreadySold(TicketKey),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    InvalidProfile(#[from] ProfileErrors),

    #[error("Claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Cannot {operation} claim {claim_id}: current state is {current}")]
    InvalidTransition {
        claim_id: String,
        current: ClaimState,
        operation: &'static str,
    },
}
