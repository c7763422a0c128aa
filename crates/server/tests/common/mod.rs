//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with a mock payment gateway injected, enabling checkout to be driven end
//! to end without a real gateway.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use ticketline_core::config::{AuthConfig, DatabaseConfig};
use ticketline_core::testing::{test_catalog, MockGateway};
use ticketline_core::{
    create_audit_system, create_authenticator, AuditStore, AuthMethod, Authenticator,
    BuyerProfile, CheckoutService, ClaimSweeper, OrderCoordinator, PaymentSigner,
    PaymentVerifier, ReservationLedger, SqliteAuditStore, SqliteTicketStore, TicketStore,
};
use ticketline_server::state::AppState;

/// Re-export fixtures for test convenience
pub use ticketline_core::testing::fixtures;

/// Admin key used when [`TestConfig::api_key`] is set.
pub const ADMIN_KEY: &str = "admin-secret";

/// Test fixture for E2E testing with a mock gateway.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_checkout() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.create_order(1, 10_050, fixtures::buyer()).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock gateway - inspect requests, inject failures
    pub gateway: Arc<MockGateway>,
    /// Signs callbacks with the configured gateway secret
    pub signer: PaymentSigner,
    pub ledger: Arc<ReservationLedger>,
    pub ticket_store: Arc<dyn TicketStore>,
    pub audit_store: Arc<dyn AuditStore>,
    /// Sweeper over the fixture's ledger (not started)
    pub sweeper: ClaimSweeper,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
    payments: std::sync::atomic::AtomicUsize,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub headers: axum::http::HeaderMap,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = fixtures::config();
        config.database = DatabaseConfig {
            path: db_path.clone(),
        };
        config.auth = match test_config.api_key {
            true => AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(ADMIN_KEY.to_string()),
            },
            false => AuthConfig::default(),
        };

        let authenticator: Arc<dyn Authenticator> =
            Arc::from(create_authenticator(&config.auth).expect("Failed to create authenticator"));

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let ticket_store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"),
        );

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let catalog = test_catalog();
        let ledger = Arc::new(ReservationLedger::new(
            Arc::clone(&catalog),
            test_config.claim_ttl,
        ));
        ledger.seed_sold(ticket_store.sold_keys().expect("Failed to load sold keys"));

        let gateway = Arc::new(MockGateway::new());
        let coordinator = OrderCoordinator::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&gateway) as Arc<dyn ticketline_core::PaymentGateway>,
            "INR",
            Some(audit_handle.clone()),
        );
        let verifier = PaymentVerifier::new(
            Arc::clone(&catalog),
            Arc::clone(&ledger),
            Arc::clone(&ticket_store),
            PaymentSigner::new(fixtures::GATEWAY_SECRET).unwrap(),
            Some(audit_handle.clone()),
        );
        let sweeper = ClaimSweeper::new(
            Arc::clone(&ledger),
            std::time::Duration::from_millis(20),
            Some(audit_handle),
        );

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&audit_store),
            Arc::clone(&ticket_store),
            catalog,
            Arc::clone(&ledger),
            Arc::new(CheckoutService::new(coordinator, verifier)),
        ));

        let router = ticketline_server::api::create_router(state);

        Self {
            router,
            gateway,
            signer: PaymentSigner::new(fixtures::GATEWAY_SECRET).unwrap(),
            ledger,
            ticket_store,
            audit_store,
            sweeper,
            temp_dir,
            payments: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, None, headers).await
    }

    /// Send a GET to an admin route with the fixture's admin key.
    pub async fn admin_get(&self, path: &str) -> TestResponse {
        let bearer = format!("Bearer {ADMIN_KEY}");
        self.request("GET", path, None, &[("Authorization", bearer.as_str())])
            .await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None, &[]).await
    }

    /// `POST /api/v1/orders`
    pub async fn create_order(
        &self,
        scheme_id: u32,
        ticket_number: u32,
        buyer: BuyerProfile,
    ) -> TestResponse {
        self.post(
            "/api/v1/orders",
            json!({
                "schemeId": scheme_id,
                "ticketNumber": ticket_number,
                "buyerProfile": buyer,
            }),
        )
        .await
    }

    /// Mint a payment id and sign it as the gateway would.
    pub fn pay(&self, gateway_order_id: &str) -> (String, String) {
        let n = self
            .payments
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let payment_id = format!("pay_test_{n}");
        let signature = self.signer.sign(gateway_order_id, &payment_id);
        (payment_id, signature)
    }

    /// `POST /api/v1/payments/verify`
    pub async fn verify(
        &self,
        gateway_order_id: &str,
        payment_id: &str,
        signature: &str,
        scheme_id: u32,
        ticket_number: u32,
        buyer: BuyerProfile,
    ) -> TestResponse {
        self.post(
            "/api/v1/payments/verify",
            json!({
                "gatewayOrderId": gateway_order_id,
                "gatewayPaymentId": payment_id,
                "gatewaySignature": signature,
                "schemeId": scheme_id,
                "ticketNumber": ticket_number,
                "buyerProfile": buyer,
            }),
        )
        .await
    }

    /// Claim, pay and verify one ticket. Returns the verify response.
    pub async fn buy(&self, scheme_id: u32, ticket_number: u32, buyer: BuyerProfile) -> TestResponse {
        let order = self
            .create_order(scheme_id, ticket_number, buyer.clone())
            .await;
        assert_eq!(order.status, StatusCode::CREATED, "order: {}", order.body);

        let order_id = order.body["order"]["gatewayOrderId"]
            .as_str()
            .expect("gatewayOrderId")
            .to_string();
        let (payment_id, signature) = self.pay(&order_id);
        self.verify(
            &order_id,
            &payment_id,
            &signature,
            scheme_id,
            ticket_number,
            buyer,
        )
        .await
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            body,
            headers,
            text,
        }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Guard admin routes with [`ADMIN_KEY`]
    pub api_key: bool,
    pub claim_ttl: chrono::Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_key: false,
            claim_ttl: chrono::Duration::minutes(15),
        }
    }
}

impl TestConfig {
    /// Admin routes require [`ADMIN_KEY`].
    pub fn with_api_key() -> Self {
        Self {
            api_key: true,
            ..Default::default()
        }
    }

    /// Claims expire after `ttl`.
    pub fn with_claim_ttl(ttl: chrono::Duration) -> Self {
        Self {
            claim_ttl: ttl,
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
