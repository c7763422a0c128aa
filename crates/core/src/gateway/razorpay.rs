//! Razorpay orders API client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::metrics::GATEWAY_REQUEST_DURATION;

use super::{GatewayError, GatewayOrder, GatewayOrderRequest, PaymentGateway};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub struct RazorpayGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.key_id.is_empty() || config.key_secret.is_empty() {
            return Err(GatewayError::Configuration(
                "razorpay requires key_id and key_secret".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }

    fn rejection(status: u16, body: &str) -> GatewayError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|env| match (env.error.code, env.error.description) {
                (Some(code), Some(desc)) => Some(format!("{code}: {desc}")),
                (None, Some(desc)) => Some(desc),
                (Some(code), None) => Some(code),
                (None, None) => None,
            })
            .unwrap_or_else(|| body.chars().take(200).collect());
        GatewayError::Rejected { status, message }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    fn key_id(&self) -> &str {
        &self.key_id
    }

    async fn create_order(
        &self,
        request: &GatewayOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders", self.base_url);
        let started = Instant::now();

        let result = async {
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(request)
                .send()
                .await
                .map_err(GatewayError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::rejection(status.as_u16(), &body));
            }

            response
                .json::<GatewayOrder>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
        }
        .await;

        let status = if result.is_ok() { "success" } else { "error" };
        GATEWAY_REQUEST_DURATION
            .with_label_values(&["razorpay", status])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => debug!("Razorpay order {} created for {}", order.id, request.receipt),
            Err(e) => warn!("Razorpay order creation failed for {}: {}", request.receipt, e),
        }
        result
    }
}
