pub mod audit;
pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod profile;
pub mod testing;
pub mod ticket;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator,
    NoneAuthenticator, Operator,
};
pub use catalog::{CatalogError, Scheme, SchemeCatalog, SchemeId};
pub use checkout::{
    CheckoutBackend, CheckoutController, CheckoutError, CheckoutPhase, CheckoutService,
    CheckoutSession, HttpCheckoutBackend, Order, OrderCoordinator, PaymentVerifier,
    Verification, VerifyError,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use gateway::{create_gateway, GatewayCallback, GatewayError, PaymentGateway, PaymentSigner};
pub use ledger::{Claim, ClaimState, ClaimSweeper, LedgerError, ReservationLedger, TicketKey};
pub use profile::{validate_profile, BuyerProfile, ProfileErrors};
pub use ticket::{SqliteTicketStore, Ticket, TicketError, TicketFilter, TicketStore};
