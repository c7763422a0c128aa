//! Ticket storage trait and query types.

use std::str::FromStr;

use thiserror::Error;

use crate::catalog::SchemeId;
use crate::ledger::TicketKey;

use super::{NewTicket, Ticket};

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket {0} has already been sold")]
    DuplicateTicketNumber(TicketKey),

    #[error("A ticket already exists for gateway order {0}")]
    DuplicateOrder(String),

    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Column to order ticket listings by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketSort {
    #[default]
    PurchaseDate,
    TicketNumber,
    AmountPaid,
}

impl TicketSort {
    pub(crate) fn column(self) -> &'static str {
        match self {
            TicketSort::PurchaseDate => "purchase_date",
            TicketSort::TicketNumber => "ticket_number",
            TicketSort::AmountPaid => "amount_paid",
        }
    }
}

impl FromStr for TicketSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchaseDate" | "purchase_date" => Ok(TicketSort::PurchaseDate),
            "ticketNumber" | "ticket_number" => Ok(TicketSort::TicketNumber),
            "amountPaid" | "amount_paid" => Ok(TicketSort::AmountPaid),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Filter for querying tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub scheme_id: Option<SchemeId>,
    pub mobile: Option<String>,
    pub sort: TicketSort,
    pub order: SortOrder,
    /// `None` returns every match.
    pub limit: Option<i64>,
    pub offset: i64,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(mut self, scheme_id: SchemeId) -> Self {
        self.scheme_id = Some(scheme_id);
        self
    }

    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = Some(mobile.into());
        self
    }

    pub fn sorted_by(mut self, sort: TicketSort, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// One-based page of `limit` tickets. Offsets past `i64::MAX` saturate.
    pub fn page(mut self, page: i64, limit: i64) -> Self {
        self.limit = Some(limit);
        self.offset = (page.max(1) - 1).saturating_mul(limit.max(0));
        self
    }
}

/// Durable, append-only record of sold tickets.
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket. Fails on a duplicate ticket number or gateway order.
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError>;

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Ticket>, TicketError>;

    /// A buyer's tickets, newest first.
    fn list_by_mobile(&self, mobile: &str) -> Result<Vec<Ticket>, TicketError>;

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Sold numbers of one scheme, ascending.
    fn sold_numbers(&self, scheme_id: SchemeId) -> Result<Vec<u32>, TicketError>;

    /// Latest purchases across all schemes.
    fn recent(&self, limit: usize) -> Result<Vec<Ticket>, TicketError>;

    /// Every sold `(scheme, number)`; used to seed the ledger at startup.
    fn sold_keys(&self) -> Result<Vec<TicketKey>, TicketError>;
}
