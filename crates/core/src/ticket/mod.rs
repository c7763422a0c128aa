//! Ticket store: the permanent record of sold tickets.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{SortOrder, TicketError, TicketFilter, TicketSort, TicketStore};
pub use types::{download_ref, NewTicket, Ticket};
