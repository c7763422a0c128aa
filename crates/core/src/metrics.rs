//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Reservation ledger (claim attempts, releases, active claims, sweeps)
//! - Checkout (orders, verifications)
//! - Payment gateway calls

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Ledger Metrics
// =============================================================================

/// Claim attempts total by result.
pub static CLAIM_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketline_claim_attempts_total", "Total claim attempts"),
        &["result"], // "granted", "already_claimed", "already_sold", "invalid"
    )
    .unwrap()
});

/// Claims released without a sale, by reason.
pub static CLAIMS_RELEASED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketline_claims_released_total",
            "Total claims released without a sale",
        ),
        &["reason"],
    )
    .unwrap()
});

/// Claims currently held in the ledger.
pub static ACTIVE_CLAIMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("ticketline_active_claims", "Claims currently held").unwrap()
});

/// Expiry sweeps run.
pub static SWEEPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticketline_sweeps_total", "Total expiry sweeps run").unwrap()
});

// =============================================================================
// Checkout Metrics
// =============================================================================

/// Orders total by result.
pub static ORDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ticketline_orders_total", "Total order creation attempts"),
        &["result"], // "created", "profile_invalid", "gateway_failed", "expired"
    )
    .unwrap()
});

/// Payment verifications total by outcome.
pub static VERIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ticketline_verifications_total",
            "Total payment verifications",
        ),
        &["outcome"], // "finalized", "replayed", "signature_invalid", "conflict", ...
    )
    .unwrap()
});

/// Tickets sold.
pub static TICKETS_SOLD: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("ticketline_tickets_sold_total", "Total tickets sold").unwrap()
});

// =============================================================================
// Gateway Metrics
// =============================================================================

/// Gateway request duration.
pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ticketline_gateway_request_duration_seconds",
            "Duration of payment gateway calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["gateway", "status"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CLAIM_ATTEMPTS.clone()),
        Box::new(CLAIMS_RELEASED.clone()),
        Box::new(ACTIVE_CLAIMS.clone()),
        Box::new(SWEEPS_TOTAL.clone()),
        Box::new(ORDERS_TOTAL.clone()),
        Box::new(VERIFICATIONS_TOTAL.clone()),
        Box::new(TICKETS_SOLD.clone()),
        Box::new(GATEWAY_REQUEST_DURATION.clone()),
    ]
}
