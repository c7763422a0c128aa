//! Reservation ledger: claimed and sold ticket numbers.

#[allow(clippy::module_inception)]
mod ledger;
mod sweeper;
mod types;

pub use ledger::ReservationLedger;
pub use sweeper::ClaimSweeper;
pub use types::*;
