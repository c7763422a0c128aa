//! Scheme catalog and sold-number lookups for the selection grid.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use ticketline_core::{Scheme, SchemeId, TicketFilter};

use super::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeSummary {
    pub id: SchemeId,
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub count: u32,
    pub ticket_price: u32,
    /// Label of the first number, e.g. `AB10001A`
    pub sample_label: String,
    pub sold: i64,
}

impl SchemeSummary {
    fn new(scheme: &Scheme, sold: i64) -> Self {
        Self {
            id: scheme.id,
            name: scheme.name.clone(),
            start: scheme.range.start,
            end: scheme.range.end(),
            count: scheme.range.count,
            ticket_price: scheme.unit_price,
            sample_label: scheme.label.format(scheme.range.start),
            sold,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldNumbersResponse {
    pub scheme_id: SchemeId,
    pub sold: Vec<u32>,
}

/// All schemes with their sold counts
pub async fn list_schemes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SchemeSummary>>, ApiError> {
    let mut summaries = Vec::new();
    for scheme in state.catalog().schemes() {
        let sold = state
            .ticket_store()
            .count(&TicketFilter::new().with_scheme(scheme.id))?;
        summaries.push(SchemeSummary::new(scheme, sold));
    }
    Ok(Json(summaries))
}

/// Sold ticket numbers for one scheme, ascending
pub async fn sold_numbers(
    State(state): State<Arc<AppState>>,
    Path(scheme_id): Path<SchemeId>,
) -> Result<Json<SoldNumbersResponse>, ApiError> {
    state.catalog().get(scheme_id)?;
    let sold = state.ticket_store().sold_numbers(scheme_id)?;
    Ok(Json(SoldNumbersResponse { scheme_id, sold }))
}
