//! Testing utilities and mock implementations.
//!
//! Mocks for both halves of the payment gateway plus fixtures for buyers,
//! configuration and a ready-made catalog and ledger, so checkout can be
//! exercised end to end without a real gateway.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticketline_core::testing::{fixtures, test_ledger, MockGateway, MockWidget};
//!
//! let ledger = test_ledger(chrono::Duration::minutes(15));
//! let gateway = MockGateway::new();
//! let widget = MockWidget::paying(fixtures::GATEWAY_SECRET);
//!
//! ledger.try_claim(1, 10_050, fixtures::buyer())?;
//! ```

mod mock_gateway;
mod mock_widget;

use std::sync::Arc;

pub use mock_gateway::MockGateway;
pub use mock_widget::{MockWidget, WidgetScript};

use crate::catalog::SchemeCatalog;
use crate::config::{load_config_from_str, Config};
use crate::ledger::ReservationLedger;

/// Catalog with the four default schemes (scheme 1 is `10001..=20000` at 50).
pub fn test_catalog() -> Arc<SchemeCatalog> {
    Arc::new(SchemeCatalog::from_config(&fixtures::config().schemes))
}

/// Empty ledger over [`test_catalog`].
pub fn test_ledger(ttl: chrono::Duration) -> ReservationLedger {
    ReservationLedger::new(test_catalog(), ttl)
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use super::*;
    use crate::profile::BuyerProfile;

    /// Gateway secret used by [`config`].
    pub const GATEWAY_SECRET: &str = "test_secret";

    /// Minimal config: mock gateway, default schemes.
    pub const CONFIG_TOML: &str = r#"
[gateway]
backend = "mock"
key_id = "rzp_test_mock"
key_secret = "test_secret"
"#;

    pub fn config() -> Config {
        load_config_from_str(CONFIG_TOML).unwrap_or_else(|e| panic!("fixture config: {e}"))
    }

    /// A valid adult buyer.
    pub fn buyer() -> BuyerProfile {
        BuyerProfile {
            full_name: "Ravi Kumar".to_string(),
            mobile: "9876543210".to_string(),
            state: "Bihar".to_string(),
            age: 25,
            aadhaar: None,
            email: None,
        }
    }

    /// A second valid buyer with a different mobile.
    pub fn other_buyer() -> BuyerProfile {
        BuyerProfile {
            full_name: "Asha Verma".to_string(),
            mobile: "9123456780".to_string(),
            state: "Maharashtra".to_string(),
            age: 31,
            aadhaar: Some("123456789012".to_string()),
            email: Some("asha@example.com".to_string()),
        }
    }
}
