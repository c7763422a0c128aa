//! JSON error replies shared by every handler.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use ticketline_core::checkout::wire::ErrorBody;
use ticketline_core::{
    AuditError, CatalogError, CheckoutError, TicketError, VerifyError,
};

/// Error reply with the JSON error body.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub ErrorBody);

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self(status, ErrorBody::new(code, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        let status = match &e {
            CheckoutError::InvalidProfile(_) => StatusCode::BAD_REQUEST,
            CheckoutError::Catalog(CatalogError::UnknownScheme(_)) => StatusCode::NOT_FOUND,
            CheckoutError::Catalog(CatalogError::OutOfRange { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CheckoutError::AlreadyClaimed(_)
            | CheckoutError::AlreadySold(_)
            | CheckoutError::VerificationInProgress(_) => StatusCode::CONFLICT,
            CheckoutError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CheckoutError::ClaimExpired(_) => StatusCode::GONE,
            CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            CheckoutError::Transport(_) | CheckoutError::Remote { .. } => StatusCode::BAD_GATEWAY,
        };

        let mut body = ErrorBody::new(e.code(), e.to_string());
        match e {
            CheckoutError::InvalidProfile(errors) => {
                body.message = "Invalid buyer profile".to_string();
                body = body.with_field_errors(errors.errors);
            }
            CheckoutError::AlreadyClaimed(_) | CheckoutError::AlreadySold(_) => {
                body = body.with_field("ticketNumber");
            }
            _ => {}
        }
        ApiError(status, body)
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        let status = match &e {
            VerifyError::SignatureInvalid => StatusCode::BAD_REQUEST,
            VerifyError::AlreadySold(_) | VerifyError::InProgress(_) => StatusCode::CONFLICT,
            VerifyError::ProfileMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VerifyError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            VerifyError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            VerifyError::Transport(_) => StatusCode::BAD_GATEWAY,
        };

        let mut body = ErrorBody::new(e.code(), e.to_string());
        match e {
            VerifyError::AlreadySold(_) => body = body.with_field("ticketNumber"),
            VerifyError::ProfileMismatch { field } => body = body.with_field(field),
            _ => {}
        }
        ApiError(status, body)
    }
}

impl From<TicketError> for ApiError {
    fn from(e: TicketError) -> Self {
        match e {
            TicketError::NotFound(id) => ApiError::not_found(format!("Ticket not found: {id}")),
            TicketError::DuplicateTicketNumber(_) | TicketError::DuplicateOrder(_) => {
                ApiError::new(StatusCode::CONFLICT, "conflict", e.to_string())
            }
            TicketError::Database(_) => ApiError::internal(e),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        ApiError::internal(format!("Failed to query audit events: {e}"))
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        CheckoutError::from(e).into()
    }
}
