use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ticketline_core::{
    create_audit_system, create_authenticator, create_gateway, load_config, validate_config,
    AuditEvent, AuditStore, Authenticator, CheckoutService, ClaimSweeper, OrderCoordinator,
    PaymentSigner, PaymentVerifier, ReservationLedger, SchemeCatalog, SqliteAuditStore,
    SqliteTicketStore, TicketStore,
};

use ticketline_server::api::create_router;
use ticketline_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TICKETLINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Gateway backend: {:?}", config.gateway.backend);
    info!("Database path: {:?}", config.database.path);

    // Hash for the ServiceStarted audit event
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Admin authenticator: {}", authenticator.method_name());

    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );

    let ticket_store: Arc<dyn TicketStore> = Arc::new(
        SqliteTicketStore::new(&config.database.path).context("Failed to create ticket store")?,
    );
    info!("Stores initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    let catalog = Arc::new(SchemeCatalog::from_config(&config.schemes));
    info!("Catalog loaded with {} schemes", config.schemes.len());

    // Sold numbers survive restarts through the ticket store
    let ttl_secs = i64::try_from(config.ledger.claim_ttl_secs).unwrap_or(i64::MAX);
    let ledger = Arc::new(ReservationLedger::new(
        Arc::clone(&catalog),
        chrono::Duration::seconds(ttl_secs),
    ));
    ledger.seed_sold(
        ticket_store
            .sold_keys()
            .context("Failed to load sold tickets")?,
    );

    let gateway = create_gateway(&config.gateway).context("Failed to create payment gateway")?;

    let coordinator = OrderCoordinator::new(
        Arc::clone(&catalog),
        Arc::clone(&ledger),
        gateway,
        config.gateway.currency.clone(),
        Some(audit_handle.clone()),
    );
    let verifier = PaymentVerifier::new(
        Arc::clone(&catalog),
        Arc::clone(&ledger),
        Arc::clone(&ticket_store),
        PaymentSigner::new(&config.gateway.key_secret)
            .context("Failed to key payment signer")?,
        Some(audit_handle.clone()),
    );
    let checkout = Arc::new(CheckoutService::new(coordinator, verifier));

    let sweeper = ClaimSweeper::new(
        Arc::clone(&ledger),
        Duration::from_millis(config.ledger.sweep_interval_ms),
        Some(audit_handle.clone()),
    );
    sweeper.start();

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        audit_store,
        ticket_store,
        catalog,
        ledger,
        checkout,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.stop();

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle clone is gone. The checkout
    // services were dropped with the router; the sweeper holds the last one.
    drop(sweeper);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
