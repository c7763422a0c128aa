//! Buyer checkout API: order creation, widget lifecycle and payment verification.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::error;

use ticketline_core::checkout::wire::{
    CreateOrderRequest, OrderStatusResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use ticketline_core::{CheckoutBackend, CheckoutError, CheckoutSession, Verification};

use super::error::ApiError;
use crate::state::AppState;

/// Claim a number and open a gateway order for it
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CheckoutSession>), ApiError> {
    let session = state.checkout().create_order(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Buyer opened the payment widget
pub async fn gateway_opened(
    State(state): State<Arc<AppState>>,
    Path(gateway_order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.checkout().gateway_opened(&gateway_order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Buyer dismissed the payment widget
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(gateway_order_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.checkout().cancel(&gateway_order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live claim behind an order
pub async fn order_status(
    State(state): State<Arc<AppState>>,
    Path(gateway_order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    match state.checkout().order_status(&gateway_order_id).await? {
        Some(status) => Ok(Json(status)),
        None => Err(CheckoutError::OrderNotFound(gateway_order_id).into()),
    }
}

/// Verify a payment callback and issue the ticket
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<(StatusCode, Json<VerifyPaymentResponse>), ApiError> {
    let verification = state.checkout().verify(request).await?;

    let status = match verification {
        Verification::Finalized(_) => StatusCode::CREATED,
        Verification::Replayed(_) => StatusCode::OK,
    };
    let replayed = verification.is_replay();
    let ticket = verification.into_ticket();

    let ticket_label = state
        .catalog()
        .format_ticket(ticket.scheme_id, ticket.ticket_number)
        .map_err(|e| {
            error!("Ticket {} references a missing scheme: {}", ticket.id, e);
            ApiError::internal(e)
        })?;

    Ok((
        status,
        Json(VerifyPaymentResponse {
            download_ref: ticket.download_ref.clone(),
            ticket_label,
            replayed,
            ticket,
        }),
    ))
}
