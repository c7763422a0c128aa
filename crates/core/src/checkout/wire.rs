//! JSON bodies shared by the HTTP API and the HTTP checkout backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::SchemeId;
use crate::gateway::GatewayCallback;
use crate::ledger::ClaimState;
use crate::profile::{BuyerProfile, FieldError};
use crate::ticket::Ticket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub scheme_id: SchemeId,
    pub ticket_number: u32,
    pub buyer_profile: BuyerProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
    pub ticket_number: u32,
    pub scheme_id: SchemeId,
    pub buyer_profile: BuyerProfile,
}

impl VerifyPaymentRequest {
    pub fn from_callback(
        callback: GatewayCallback,
        scheme_id: SchemeId,
        ticket_number: u32,
        buyer_profile: BuyerProfile,
    ) -> Self {
        Self {
            gateway_order_id: callback.gateway_order_id,
            gateway_payment_id: callback.gateway_payment_id,
            gateway_signature: callback.gateway_signature,
            ticket_number,
            scheme_id,
            buyer_profile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub ticket: Ticket,
    pub download_ref: String,
    pub ticket_label: String,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub gateway_order_id: String,
    pub claim_id: String,
    pub state: ClaimState,
    pub expires_at: DateTime<Utc>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `already_claimed`.
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<Vec<FieldError>>,
    /// Form field a conflict should be shown against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field_errors: None,
            field: None,
        }
    }

    pub fn with_field_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.field_errors = Some(errors);
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}
