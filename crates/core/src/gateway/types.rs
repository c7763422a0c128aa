use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::SchemeId;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    ConnectionFailed(String),

    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("Gateway configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_connect() {
            GatewayError::ConnectionFailed(e.to_string())
        } else if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::ConnectionFailed(e.to_string())
        }
    }
}

/// Metadata attached to a gateway order, visible in the gateway dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotes {
    pub full_name: String,
    pub mobile: String,
    pub scheme_id: SchemeId,
}

/// Request to open a payment order at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Amount in minor units (paise).
    pub amount: u64,
    pub currency: String,
    /// Our reference for the order; the claim id.
    pub receipt: String,
    pub notes: OrderNotes,
}

/// Order as created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Completion message the gateway widget hands back after a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCallback {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

/// Buyer details pre-filled into the gateway widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefill {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub contact: String,
}

/// How a widget session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOutcome {
    Completed(GatewayCallback),
    /// Buyer closed the widget without paying.
    Dismissed,
}
