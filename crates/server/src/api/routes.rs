use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{audit, checkout, handlers, schemes, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Operator routes, behind the configured authenticator
    let admin_routes = Router::new()
        .route("/tickets", get(tickets::admin_list))
        .route("/tickets/export", get(tickets::admin_export))
        .route("/audit", get(audit::query_audit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Checkout
        .route("/orders", post(checkout::create_order))
        .route("/orders/{id}", get(checkout::order_status))
        .route("/orders/{id}/open", post(checkout::gateway_opened))
        .route("/orders/{id}/cancel", post(checkout::cancel_order))
        .route("/payments/verify", post(checkout::verify_payment))
        // Schemes
        .route("/schemes", get(schemes::list_schemes))
        .route("/schemes/{id}/sold", get(schemes::sold_numbers))
        // Tickets
        .route("/tickets/recent", get(tickets::recent))
        .route("/tickets/by-mobile/{mobile}", get(tickets::list_by_mobile))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}/download", get(tickets::download_ticket))
        .nest("/admin", admin_routes)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
