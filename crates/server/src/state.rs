use std::sync::Arc;

use ticketline_core::{
    AuditStore, Authenticator, CheckoutService, Config, ReservationLedger,
    SanitizedConfig, SchemeCatalog, TicketStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit_store: Arc<dyn AuditStore>,
    ticket_store: Arc<dyn TicketStore>,
    catalog: Arc<SchemeCatalog>,
    ledger: Arc<ReservationLedger>,
    checkout: Arc<CheckoutService>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit_store: Arc<dyn AuditStore>,
        ticket_store: Arc<dyn TicketStore>,
        catalog: Arc<SchemeCatalog>,
        ledger: Arc<ReservationLedger>,
        checkout: Arc<CheckoutService>,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit_store,
            ticket_store,
            catalog,
            ledger,
            checkout,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn ticket_store(&self) -> &dyn TicketStore {
        self.ticket_store.as_ref()
    }

    pub fn catalog(&self) -> &SchemeCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &ReservationLedger {
        &self.ledger
    }

    pub fn checkout(&self) -> &CheckoutService {
        &self.checkout
    }
}
