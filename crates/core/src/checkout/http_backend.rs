//! Checkout backend that talks to a remote ticketline server over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::catalog::CatalogError;
use crate::ledger::TicketKey;
use crate::profile::ProfileErrors;

use super::backend::CheckoutBackend;
use super::wire::{
    CreateOrderRequest, ErrorBody, OrderStatusResponse, VerifyPaymentRequest,
    VerifyPaymentResponse,
};
use super::{CheckoutError, CheckoutSession, Verification, VerifyError};

pub struct HttpCheckoutBackend {
    client: Client,
    /// Server root including the API prefix, e.g. `http://host:5000/api/v1`.
    base_url: String,
}

impl HttpCheckoutBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CheckoutError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read an error body, falling back to the status line when the body is not ours.
    async fn error_body(response: Response) -> ErrorBody {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text).unwrap_or_else(|_| {
            ErrorBody::new(
                "http_error",
                format!("{} {}", status.as_u16(), text.chars().take(200).collect::<String>()),
            )
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, String> {
        response.json::<T>().await.map_err(|e| e.to_string())
    }

    async fn post_empty(&self, path: &str) -> Result<(), CheckoutError> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;
        if response.status().is_success() {
            return Ok(());
        }
        let body = Self::error_body(response).await;
        Err(checkout_error(body, None))
    }
}

/// Rebuild a typed checkout error from the wire body.
fn checkout_error(body: ErrorBody, key: Option<TicketKey>) -> CheckoutError {
    match (body.error.as_str(), key) {
        ("invalid_profile", _) => CheckoutError::InvalidProfile(ProfileErrors {
            errors: body.field_errors.unwrap_or_default(),
        }),
        ("unknown_scheme", Some(key)) => {
            CheckoutError::Catalog(CatalogError::UnknownScheme(key.scheme_id))
        }
        ("already_claimed", Some(key)) => CheckoutError::AlreadyClaimed(key),
        ("already_sold", Some(key)) => CheckoutError::AlreadySold(key),
        ("gateway_unavailable", _) => CheckoutError::GatewayUnavailable(body.message),
        ("claim_expired", _) => CheckoutError::ClaimExpired(body.message),
        ("order_not_found", _) => CheckoutError::OrderNotFound(body.message),
        ("verification_in_progress", _) => CheckoutError::VerificationInProgress(body.message),
        _ => CheckoutError::Remote {
            code: body.error,
            message: body.message,
        },
    }
}

/// Rebuild a typed verification error from the wire body.
fn verify_error(body: ErrorBody, key: TicketKey) -> VerifyError {
    match body.error.as_str() {
        "signature_invalid" => VerifyError::SignatureInvalid,
        "already_sold" => VerifyError::AlreadySold(key),
        "profile_mismatch" => VerifyError::ProfileMismatch {
            field: match body.field.as_deref() {
                Some("mobile") => "mobile",
                Some("ticketNumber") => "ticketNumber",
                _ => "buyerProfile",
            },
        },
        "unknown_order" => VerifyError::UnknownOrder(body.message),
        "verification_in_progress" => VerifyError::InProgress(body.message),
        "storage" => VerifyError::Storage(body.message),
        _ => VerifyError::Transport(format!("{}: {}", body.error, body.message)),
    }
}

#[async_trait]
impl CheckoutBackend for HttpCheckoutBackend {
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let key = TicketKey::new(request.scheme_id, request.ticket_number);
        let response = self
            .client
            .post(self.url("/orders"))
            .json(&request)
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        if response.status().is_success() {
            let session: CheckoutSession = Self::json(response)
                .await
                .map_err(CheckoutError::Transport)?;
            debug!("Order {} opened for {}", session.order.gateway_order_id, key);
            return Ok(session);
        }
        let body = Self::error_body(response).await;
        Err(checkout_error(body, Some(key)))
    }

    async fn gateway_opened(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        self.post_empty(&format!("/orders/{gateway_order_id}/open"))
            .await
    }

    async fn cancel(&self, gateway_order_id: &str) -> Result<(), CheckoutError> {
        self.post_empty(&format!("/orders/{gateway_order_id}/cancel"))
            .await
    }

    async fn order_status(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<OrderStatusResponse>, CheckoutError> {
        let response = self
            .client
            .get(self.url(&format!("/orders/{gateway_order_id}")))
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::json(response)
                .await
                .map(Some)
                .map_err(CheckoutError::Transport),
            _ => Err(checkout_error(Self::error_body(response).await, None)),
        }
    }

    async fn verify(&self, request: VerifyPaymentRequest) -> Result<Verification, VerifyError> {
        let key = TicketKey::new(request.scheme_id, request.ticket_number);
        let response = self
            .client
            .post(self.url("/payments/verify"))
            .json(&request)
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        if response.status().is_success() {
            let body: VerifyPaymentResponse =
                Self::json(response).await.map_err(VerifyError::Transport)?;
            return Ok(if body.replayed {
                Verification::Replayed(body.ticket)
            } else {
                Verification::Finalized(body.ticket)
            });
        }
        let body = Self::error_body(response).await;
        Err(verify_error(body, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{FieldError, ProfileField};
    use crate::testing::fixtures;

    #[test]
    fn test_checkout_error_codes_round_trip() {
        let key = TicketKey::new(1, 10_050);

        let err = checkout_error(ErrorBody::new("already_claimed", "taken"), Some(key));
        assert!(matches!(err, CheckoutError::AlreadyClaimed(k) if k == key));

        let err = checkout_error(
            ErrorBody::new("invalid_profile", "bad").with_field_errors(vec![FieldError {
                field: ProfileField::Age,
                message: "Age must be 18 or over".to_string(),
            }]),
            Some(key),
        );
        match err {
            CheckoutError::InvalidProfile(errors) => assert!(errors.has(ProfileField::Age)),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = checkout_error(ErrorBody::new("out_of_range", "nope"), Some(key));
        assert_eq!(err.code(), "out_of_range");
    }

    #[test]
    fn test_verify_error_codes_round_trip() {
        let key = TicketKey::new(1, 10_050);

        assert!(matches!(
            verify_error(ErrorBody::new("signature_invalid", "x"), key),
            VerifyError::SignatureInvalid
        ));
        assert!(matches!(
            verify_error(
                ErrorBody::new("profile_mismatch", "x").with_field("mobile"),
                key
            ),
            VerifyError::ProfileMismatch { field: "mobile" }
        ));
        let err = verify_error(ErrorBody::new("storage", "disk full"), key);
        assert!(err.is_retryable());
        let err = verify_error(ErrorBody::new("teapot", "short and stout"), key);
        assert!(matches!(err, VerifyError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 1 on loopback refuses connections.
        let backend =
            HttpCheckoutBackend::new("http://127.0.0.1:1/api/v1", Duration::from_secs(2)).unwrap();

        let result = backend
            .create_order(CreateOrderRequest {
                scheme_id: 1,
                ticket_number: 10_050,
                buyer_profile: fixtures::buyer(),
            })
            .await;
        assert!(matches!(result, Err(CheckoutError::Transport(_))));
    }
}
