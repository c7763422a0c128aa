//! Buyer-side checkout flow.
//!
//! ```text
//! Idle -> FormValidation -> AwaitingOrder -> GatewayOpen -> AwaitingVerification -> Success
//!  ^           |                  |               |                  |
//!  `-----------'                  `---------------`------------------`--> Error -> retry/reset
//! ```
//!
//! One controller drives one purchase at a time. Every await happens with the
//! controller exclusively borrowed, so a second submit cannot interleave.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::SchemeId;
use crate::gateway::{GatewayCallback, GatewayWidget, WidgetOutcome};
use crate::ledger::ClaimState;
use crate::profile::{validate_profile, BuyerProfile, FieldError};
use crate::ticket::Ticket;

use super::backend::CheckoutBackend;
use super::wire::{CreateOrderRequest, VerifyPaymentRequest};
use super::{CheckoutError, CheckoutSession, VerifyError};

/// Broad category of a failed purchase, used to pick the buyer-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Buyer dismissed the payment widget.
    Cancelled,
    /// Payment succeeded but the number went to someone else.
    Conflict,
    /// Payment failed verification.
    Rejected,
    /// Number was claimed or sold before the order was created.
    Taken,
    /// Gateway could not create an order; nothing was charged.
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Form field the message belongs to, if any.
    pub field: Option<String>,
    /// Whether resending the same payment callback may succeed.
    pub retryable: bool,
}

impl CheckoutFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutPhase {
    Idle,
    FormValidation,
    AwaitingOrder,
    GatewayOpen,
    AwaitingVerification,
    Success(Ticket),
    Error(CheckoutFailure),
}

impl CheckoutPhase {
    pub fn name(&self) -> &'static str {
        match self {
            CheckoutPhase::Idle => "idle",
            CheckoutPhase::FormValidation => "form_validation",
            CheckoutPhase::AwaitingOrder => "awaiting_order",
            CheckoutPhase::GatewayOpen => "gateway_open",
            CheckoutPhase::AwaitingVerification => "awaiting_verification",
            CheckoutPhase::Success(_) => "success",
            CheckoutPhase::Error(_) => "error",
        }
    }
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: &'static str,
    },

    #[error("No ticket number selected")]
    NoSelection,
}

/// Keep only the digits of a typed mobile number.
pub fn sanitize_mobile(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Selection {
    scheme_id: SchemeId,
    ticket_number: u32,
}

pub struct CheckoutController<B, W> {
    backend: B,
    widget: W,
    phase: CheckoutPhase,
    history: Vec<&'static str>,
    selection: Option<Selection>,
    profile: Option<BuyerProfile>,
    field_errors: Vec<FieldError>,
    session: Option<CheckoutSession>,
    /// Callback awaiting a successful verify; kept for retries.
    pending: Option<GatewayCallback>,
}

impl<B: CheckoutBackend, W: GatewayWidget> CheckoutController<B, W> {
    pub fn new(backend: B, widget: W) -> Self {
        Self {
            backend,
            widget,
            phase: CheckoutPhase::Idle,
            history: vec![CheckoutPhase::Idle.name()],
            selection: None,
            profile: None,
            field_errors: Vec::new(),
            session: None,
            pending: None,
        }
    }

    pub fn phase(&self) -> &CheckoutPhase {
        &self.phase
    }

    /// Names of every phase entered so far, oldest first.
    pub fn history(&self) -> &[&'static str] {
        &self.history
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    pub fn session(&self) -> Option<&CheckoutSession> {
        self.session.as_ref()
    }

    pub fn selected(&self) -> Option<(SchemeId, u32)> {
        self.selection.map(|s| (s.scheme_id, s.ticket_number))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn enter(&mut self, phase: CheckoutPhase) {
        debug!("Checkout {} -> {}", self.phase, phase);
        self.history.push(phase.name());
        self.phase = phase;
    }

    fn fail(&mut self, failure: CheckoutFailure) -> &CheckoutPhase {
        warn!("Checkout failed ({:?}): {}", failure.kind, failure.message);
        self.enter(CheckoutPhase::Error(failure));
        &self.phase
    }

    fn require_idle(&self, operation: &'static str) -> Result<(), ControllerError> {
        if self.phase == CheckoutPhase::Idle {
            Ok(())
        } else {
            Err(ControllerError::InvalidState {
                operation,
                phase: self.phase.name(),
            })
        }
    }

    /// Pick the number to buy.
    pub fn select(&mut self, scheme_id: SchemeId, ticket_number: u32) -> Result<(), ControllerError> {
        self.require_idle("select")?;
        self.selection = Some(Selection {
            scheme_id,
            ticket_number,
        });
        Ok(())
    }

    /// Validate the form and run the purchase through to a ticket or an error.
    ///
    /// A profile that fails validation returns to `Idle` with
    /// [`field_errors`](Self::field_errors) populated and no order is created.
    pub async fn submit(&mut self, profile: BuyerProfile) -> Result<&CheckoutPhase, ControllerError> {
        self.require_idle("submit")?;
        let selection = self.selection.ok_or(ControllerError::NoSelection)?;

        self.enter(CheckoutPhase::FormValidation);
        let mut profile = profile;
        profile.mobile = sanitize_mobile(&profile.mobile);
        let profile = profile.normalized();

        if let Err(errors) = validate_profile(&profile) {
            self.field_errors = errors.errors;
            self.enter(CheckoutPhase::Idle);
            return Ok(&self.phase);
        }
        self.field_errors.clear();
        self.profile = Some(profile.clone());

        self.enter(CheckoutPhase::AwaitingOrder);
        let request = CreateOrderRequest {
            scheme_id: selection.scheme_id,
            ticket_number: selection.ticket_number,
            buyer_profile: profile,
        };
        match self.backend.create_order(request).await {
            Ok(session) => {
                info!(
                    "Order {} created for ticket {}",
                    session.order.gateway_order_id, session.ticket_label
                );
                self.session = Some(session);
            }
            Err(CheckoutError::InvalidProfile(errors)) => {
                self.field_errors = errors.errors;
                self.enter(CheckoutPhase::Idle);
                return Ok(&self.phase);
            }
            Err(e) => return Ok(self.fail(order_failure(e))),
        }

        Ok(self.run_gateway().await)
    }

    async fn run_gateway(&mut self) -> &CheckoutPhase {
        let Some(session) = self.session.clone() else {
            return self.fail(CheckoutFailure::new(FailureKind::Failed, "No open order"));
        };
        let order_id = session.order.gateway_order_id.clone();

        self.enter(CheckoutPhase::GatewayOpen);
        if let Err(e) = self.backend.gateway_opened(&order_id).await {
            warn!("Failed to report widget open for order {}: {}", order_id, e);
        }

        match self.widget.open(&session).await {
            WidgetOutcome::Completed(callback) => {
                self.pending = Some(callback);
                self.verify_pending().await
            }
            WidgetOutcome::Dismissed => {
                if let Err(e) = self.backend.cancel(&order_id).await {
                    warn!("Failed to release order {} after dismissal: {}", order_id, e);
                }
                self.fail(CheckoutFailure::new(
                    FailureKind::Cancelled,
                    "Payment cancelled. Your number has been released.",
                ))
            }
        }
    }

    async fn verify_pending(&mut self) -> &CheckoutPhase {
        let (Some(callback), Some(selection), Some(profile)) =
            (self.pending.clone(), self.selection, self.profile.clone())
        else {
            return self.fail(CheckoutFailure::new(
                FailureKind::Failed,
                "Nothing to verify",
            ));
        };

        self.enter(CheckoutPhase::AwaitingVerification);
        let request = VerifyPaymentRequest::from_callback(
            callback,
            selection.scheme_id,
            selection.ticket_number,
            profile,
        );

        match self.backend.verify(request).await {
            Ok(verification) => {
                self.pending = None;
                let ticket = verification.into_ticket();
                info!("Ticket {} purchased", ticket.id);
                self.enter(CheckoutPhase::Success(ticket));
                &self.phase
            }
            Err(e) => {
                if !e.is_retryable() {
                    self.pending = None;
                }
                self.fail(verify_failure(e))
            }
        }
    }

    /// Resume after an error.
    ///
    /// A retryable verification is resent; an order whose claim is still held
    /// reopens the widget on the same number; anything else returns to `Idle`
    /// with the selection cleared.
    pub async fn retry(&mut self) -> Result<&CheckoutPhase, ControllerError> {
        let retryable = match &self.phase {
            CheckoutPhase::Error(failure) => failure.retryable,
            other => {
                return Err(ControllerError::InvalidState {
                    operation: "retry",
                    phase: other.name(),
                })
            }
        };

        if retryable && self.pending.is_some() {
            return Ok(self.verify_pending().await);
        }

        if let Some(order_id) = self.session.as_ref().map(|s| s.order.gateway_order_id.clone()) {
            match self.backend.order_status(&order_id).await {
                Ok(Some(status))
                    if matches!(
                        status.state,
                        ClaimState::OrderCreated | ClaimState::AwaitingGateway
                    ) =>
                {
                    if let Some(session) = self.session.as_mut() {
                        session.expires_at = status.expires_at;
                    }
                    return Ok(self.run_gateway().await);
                }
                Ok(_) => debug!("Claim for order {} no longer held", order_id),
                Err(e) => warn!("Could not check order {}: {}", order_id, e),
            }
        }

        self.clear();
        self.enter(CheckoutPhase::Idle);
        Ok(&self.phase)
    }

    /// Abandon the current flow and return to `Idle`.
    pub fn reset(&mut self) -> Result<(), ControllerError> {
        match self.phase {
            CheckoutPhase::Idle | CheckoutPhase::Success(_) | CheckoutPhase::Error(_) => {
                self.clear();
                self.field_errors.clear();
                self.enter(CheckoutPhase::Idle);
                Ok(())
            }
            ref other => Err(ControllerError::InvalidState {
                operation: "reset",
                phase: other.name(),
            }),
        }
    }

    fn clear(&mut self) {
        self.selection = None;
        self.profile = None;
        self.session = None;
        self.pending = None;
    }
}

fn order_failure(e: CheckoutError) -> CheckoutFailure {
    let kind = match &e {
        CheckoutError::AlreadyClaimed(_) | CheckoutError::AlreadySold(_) => FailureKind::Taken,
        CheckoutError::GatewayUnavailable(_) | CheckoutError::Transport(_) => {
            FailureKind::Unavailable
        }
        _ => FailureKind::Failed,
    };
    let mut failure = CheckoutFailure::new(kind, e.to_string());
    if kind == FailureKind::Taken {
        failure.field = Some("ticketNumber".to_string());
    }
    failure
}

fn verify_failure(e: VerifyError) -> CheckoutFailure {
    let kind = match &e {
        VerifyError::SignatureInvalid | VerifyError::ProfileMismatch { .. } => {
            FailureKind::Rejected
        }
        VerifyError::AlreadySold(_) => FailureKind::Conflict,
        _ => FailureKind::Failed,
    };
    let mut failure = CheckoutFailure::new(kind, e.to_string());
    failure.retryable = e.is_retryable();
    match e {
        VerifyError::AlreadySold(_) => failure.field = Some("ticketNumber".to_string()),
        VerifyError::ProfileMismatch { field } => failure.field = Some(field.to_string()),
        _ => {}
    }
    failure
}
