use thiserror::Error;

use crate::catalog::CatalogError;
use crate::ledger::{LedgerError, TicketKey};
use crate::profile::ProfileErrors;

/// Failures while claiming a number and opening an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    InvalidProfile(#[from] ProfileErrors),

    #[error("Ticket {0} is already claimed")]
    AlreadyClaimed(TicketKey),

    #[error("Ticket {0} is already sold")]
    AlreadySold(TicketKey),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Claim {0} expired before the order was created")]
    ClaimExpired(String),

    #[error("No open checkout for order {0}")]
    OrderNotFound(String),

    #[error("Checkout for order {0} is being verified")]
    VerificationInProgress(String),

    #[error("Checkout request failed: {0}")]
    Transport(String),

    #[error("Server rejected checkout ({code}): {message}")]
    Remote { code: String, message: String },
}

impl CheckoutError {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &str {
        match self {
            CheckoutError::Catalog(CatalogError::UnknownScheme(_)) => "unknown_scheme",
            CheckoutError::Catalog(CatalogError::OutOfRange { .. }) => "out_of_range",
            CheckoutError::InvalidProfile(_) => "invalid_profile",
            CheckoutError::AlreadyClaimed(_) => "already_claimed",
            CheckoutError::AlreadySold(_) => "already_sold",
            CheckoutError::GatewayUnavailable(_) => "gateway_unavailable",
            CheckoutError::ClaimExpired(_) => "claim_expired",
            CheckoutError::OrderNotFound(_) => "order_not_found",
            CheckoutError::VerificationInProgress(_) => "verification_in_progress",
            CheckoutError::Transport(_) => "transport",
            CheckoutError::Remote { code, .. } => code,
        }
    }
}

impl From<LedgerError> for CheckoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AlreadyClaimed(key) => CheckoutError::AlreadyClaimed(key),
            LedgerError::AlreadySold(key) => CheckoutError::AlreadySold(key),
            LedgerError::Catalog(e) => CheckoutError::Catalog(e),
            LedgerError::InvalidProfile(e) => CheckoutError::InvalidProfile(e),
            LedgerError::ClaimNotFound(id) => CheckoutError::ClaimExpired(id),
            LedgerError::InvalidTransition { claim_id, .. } => {
                CheckoutError::VerificationInProgress(claim_id)
            }
        }
    }
}

/// Failures while verifying a payment callback.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Payment signature verification failed")]
    SignatureInvalid,

    #[error("Ticket {0} was sold to someone else; contact support")]
    AlreadySold(TicketKey),

    #[error("Callback {field} does not match the claim")]
    ProfileMismatch { field: &'static str },

    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    #[error("Order {0} is already being verified")]
    InProgress(String),

    #[error("Ticket could not be stored: {0}")]
    Storage(String),

    #[error("Verification request failed: {0}")]
    Transport(String),
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::SignatureInvalid => "signature_invalid",
            VerifyError::AlreadySold(_) => "already_sold",
            VerifyError::ProfileMismatch { .. } => "profile_mismatch",
            VerifyError::UnknownOrder(_) => "unknown_order",
            VerifyError::InProgress(_) => "verification_in_progress",
            VerifyError::Storage(_) => "storage",
            VerifyError::Transport(_) => "transport",
        }
    }

    /// Whether resending the same callback may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerifyError::InProgress(_) | VerifyError::Storage(_) | VerifyError::Transport(_)
        )
    }
}
