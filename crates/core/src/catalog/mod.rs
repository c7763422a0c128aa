//! Read-only scheme catalog.
//!
//! Loaded once from configuration and shared behind an `Arc`; nothing mutates
//! it after startup.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::config::SchemeConfig;

/// Identifier of a sales scheme.
pub type SchemeId = u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown scheme: {0}")]
    UnknownScheme(SchemeId),

    #[error("Ticket {ticket_number} is outside scheme {scheme_id} range {start}..={end}")]
    OutOfRange {
        scheme_id: SchemeId,
        ticket_number: u32,
        start: u32,
        end: u32,
    },
}

/// Contiguous range of ticket numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TicketRange {
    pub start: u32,
    pub count: u32,
}

impl TicketRange {
    /// Last number in the range (inclusive).
    pub fn end(&self) -> u32 {
        self.start + (self.count - 1)
    }

    pub fn contains(&self, number: u32) -> bool {
        number >= self.start && number <= self.end()
    }
}

/// Label format for printed ticket numbers, e.g. `AB10050A`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketLabel {
    pub prefix: String,
    pub suffix: String,
}

impl TicketLabel {
    pub fn format(&self, number: u32) -> String {
        format!("{}{}{}", self.prefix, number, self.suffix)
    }
}

/// A sales pool of sequentially numbered tickets at a fixed price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scheme {
    pub id: SchemeId,
    pub name: String,
    pub range: TicketRange,
    /// Price per ticket in major currency units.
    pub unit_price: u32,
    pub label: TicketLabel,
}

impl Scheme {
    /// Price in minor units (paise) as expected by the gateway.
    pub fn unit_price_minor(&self) -> u64 {
        u64::from(self.unit_price) * 100
    }
}

impl From<&SchemeConfig> for Scheme {
    fn from(config: &SchemeConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            range: TicketRange {
                start: config.start,
                count: config.count,
            },
            unit_price: config.ticket_price,
            label: TicketLabel {
                prefix: config.prefix.clone(),
                suffix: config.suffix.clone(),
            },
        }
    }
}

/// Immutable scheme lookup table.
#[derive(Debug, Clone, Default)]
pub struct SchemeCatalog {
    schemes: BTreeMap<SchemeId, Scheme>,
}

impl SchemeCatalog {
    /// Build the catalog from validated scheme configuration.
    pub fn from_config(schemes: &[SchemeConfig]) -> Self {
        Self {
            schemes: schemes.iter().map(|s| (s.id, Scheme::from(s))).collect(),
        }
    }

    pub fn get(&self, id: SchemeId) -> Result<&Scheme, CatalogError> {
        self.schemes.get(&id).ok_or(CatalogError::UnknownScheme(id))
    }

    /// All schemes ordered by id.
    pub fn schemes(&self) -> impl Iterator<Item = &Scheme> {
        self.schemes.values()
    }

    /// Resolve the scheme and check the number lies in its range.
    pub fn check_number(&self, id: SchemeId, ticket_number: u32) -> Result<&Scheme, CatalogError> {
        let scheme = self.get(id)?;
        if !scheme.range.contains(ticket_number) {
            return Err(CatalogError::OutOfRange {
                scheme_id: id,
                ticket_number,
                start: scheme.range.start,
                end: scheme.range.end(),
            });
        }
        Ok(scheme)
    }

    /// Printed label for a ticket number. Unknown schemes are an error, never a fallback.
    pub fn format_ticket(&self, id: SchemeId, ticket_number: u32) -> Result<String, CatalogError> {
        Ok(self.get(id)?.label.format(ticket_number))
    }
}
