//! Ticket API handlers: buyer lookups, receipts and the admin listing/export.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use ticketline_core::profile::is_digits;
use ticketline_core::ticket::{SortOrder, TicketSort};
use ticketline_core::{SchemeCatalog, Ticket, TicketFilter};

use super::error::ApiError;
use super::middleware::AuthOperator;
use crate::state::AppState;

/// Maximum allowed page size for admin listings
const MAX_LIMIT: i64 = 500;

/// Default page size for admin listings
const DEFAULT_LIMIT: i64 = 50;

/// Default and maximum size of the recent purchases feed
const RECENT_DEFAULT: usize = 10;
const RECENT_MAX: usize = 50;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Ticket with its printed label
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub ticket_label: String,
}

impl TicketView {
    fn new(catalog: &SchemeCatalog, ticket: Ticket) -> Result<Self, ApiError> {
        let ticket_label = catalog
            .format_ticket(ticket.scheme_id, ticket.ticket_number)
            .map_err(ApiError::internal)?;
        Ok(Self {
            ticket,
            ticket_label,
        })
    }
}

fn views(catalog: &SchemeCatalog, tickets: Vec<Ticket>) -> Result<Vec<TicketView>, ApiError> {
    tickets
        .into_iter()
        .map(|t| TicketView::new(catalog, t))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

/// Query parameters for the admin ticket listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListParams {
    pub scheme_id: Option<u32>,
    pub mobile: Option<String>,
    /// 1-based page number
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// `purchaseDate` (default), `ticketNumber` or `amountPaid`
    pub sort: Option<String>,
    /// `asc` or `desc` (default)
    pub order: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminListResponse {
    pub tickets: Vec<TicketView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// Downloadable purchase receipt
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReceipt {
    pub ticket_id: String,
    pub ticket_label: String,
    pub scheme_name: String,
    pub ticket_number: u32,
    pub full_name: String,
    pub mobile: String,
    pub state: String,
    pub amount_paid: u32,
    pub purchase_date: DateTime<Utc>,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
}

// ============================================================================
// Buyer Handlers
// ============================================================================

/// Tickets bought with a mobile number, newest first
pub async fn list_by_mobile(
    State(state): State<Arc<AppState>>,
    Path(mobile): Path<String>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    if !is_digits(&mobile, 10) {
        return Err(ApiError::bad_request("Mobile must be 10 digits"));
    }
    let tickets = state.ticket_store().list_by_mobile(&mobile)?;
    Ok(Json(views(state.catalog(), tickets)?))
}

/// Latest purchases across all schemes
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<TicketView>>, ApiError> {
    let limit = params.limit.unwrap_or(RECENT_DEFAULT).clamp(1, RECENT_MAX);
    let tickets = state.ticket_store().recent(limit)?;
    Ok(Json(views(state.catalog(), tickets)?))
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TicketView>, ApiError> {
    let ticket = state
        .ticket_store()
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(format!("Ticket not found: {id}")))?;
    Ok(Json(TicketView::new(state.catalog(), ticket)?))
}

/// Receipt for a ticket as a JSON attachment
pub async fn download_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .ticket_store()
        .get(&id)?
        .ok_or_else(|| ApiError::not_found(format!("Ticket not found: {id}")))?;
    let scheme = state
        .catalog()
        .get(ticket.scheme_id)
        .map_err(ApiError::internal)?;

    let receipt = TicketReceipt {
        ticket_id: ticket.id.clone(),
        ticket_label: scheme.label.format(ticket.ticket_number),
        scheme_name: scheme.name.clone(),
        ticket_number: ticket.ticket_number,
        full_name: ticket.buyer.full_name,
        mobile: ticket.buyer.mobile,
        state: ticket.buyer.state,
        amount_paid: ticket.amount_paid,
        purchase_date: ticket.purchase_date,
        gateway_order_id: ticket.gateway_order_id,
        gateway_payment_id: ticket.gateway_payment_id,
    };

    let disposition = format!("attachment; filename=\"ticket-{}.json\"", receipt.ticket_label);
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(receipt)))
}

// ============================================================================
// Admin Handlers
// ============================================================================

fn admin_filter(params: &AdminListParams) -> Result<TicketFilter, ApiError> {
    let sort = match params.sort.as_deref() {
        Some(s) => s.parse::<TicketSort>().map_err(ApiError::bad_request)?,
        None => TicketSort::default(),
    };
    let order = match params.order.as_deref() {
        Some(o) => o.parse::<SortOrder>().map_err(ApiError::bad_request)?,
        None => SortOrder::default(),
    };

    let mut filter = TicketFilter::new().sorted_by(sort, order);
    if let Some(scheme_id) = params.scheme_id {
        filter = filter.with_scheme(scheme_id);
    }
    if let Some(ref mobile) = params.mobile {
        filter = filter.with_mobile(mobile);
    }
    Ok(filter)
}

/// Paginated ticket listing
pub async fn admin_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminListParams>,
) -> Result<Json<AdminListResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let page = params.page.unwrap_or(1).max(1);
    if (page - 1).checked_mul(limit).is_none() {
        return Err(ApiError::bad_request(format!("page {page} is out of range")));
    }
    let base = admin_filter(&params)?;

    let total = state.ticket_store().count(&base)?;
    let tickets = state.ticket_store().list(&base.page(page, limit))?;

    Ok(Json(AdminListResponse {
        tickets: views(state.catalog(), tickets)?,
        total,
        page,
        limit,
        total_pages: (total + limit - 1) / limit,
    }))
}

const CSV_HEADER: &str = "Ticket,Scheme,Number,Name,Mobile,State,Age,Email,Amount,Purchased,Order,Payment";

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(catalog: &SchemeCatalog, ticket: &Ticket) -> Result<String, ApiError> {
    let scheme = catalog.get(ticket.scheme_id).map_err(ApiError::internal)?;
    let fields = [
        scheme.label.format(ticket.ticket_number),
        scheme.name.clone(),
        ticket.ticket_number.to_string(),
        ticket.buyer.full_name.clone(),
        ticket.buyer.mobile.clone(),
        ticket.buyer.state.clone(),
        ticket.buyer.age.to_string(),
        ticket.buyer.email.clone().unwrap_or_default(),
        ticket.amount_paid.to_string(),
        ticket.purchase_date.to_rfc3339(),
        ticket.gateway_order_id.clone(),
        ticket.gateway_payment_id.clone(),
    ];
    Ok(fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(","))
}

/// CSV export of the filtered ticket set (ignores pagination)
pub async fn admin_export(
    State(state): State<Arc<AppState>>,
    AuthOperator(operator): AuthOperator,
    Query(params): Query<AdminListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let tickets = state.ticket_store().list(&admin_filter(&params)?)?;
    info!("{} exported {} tickets", operator, tickets.len());

    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for ticket in &tickets {
        csv.push_str(&csv_row(state.catalog(), ticket)?);
        csv.push('\n');
    }

    let disposition = format!(
        "attachment; filename=\"tickets-{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
