//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::catalog::SchemeId;
use crate::ledger::TicketKey;
use crate::profile::BuyerProfile;

use super::store::SortOrder;
use super::{download_ref, NewTicket, Ticket, TicketError, TicketFilter, TicketStore};

const COLUMNS: &str = "id, scheme_id, ticket_number, full_name, mobile, state, age, aadhaar, email, \
     amount_paid, gateway_order_id, gateway_payment_id, gateway_signature, purchase_date";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Open (or create) the ticket database at `path`.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, TicketError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                scheme_id INTEGER NOT NULL,
                ticket_number INTEGER NOT NULL,
                full_name TEXT NOT NULL,
                mobile TEXT NOT NULL,
                state TEXT NOT NULL,
                age INTEGER NOT NULL,
                aadhaar TEXT,
                email TEXT,
                amount_paid INTEGER NOT NULL,
                gateway_order_id TEXT NOT NULL UNIQUE,
                gateway_payment_id TEXT NOT NULL,
                gateway_signature TEXT NOT NULL,
                purchase_date TEXT NOT NULL,
                UNIQUE (scheme_id, ticket_number)
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_mobile ON tickets(mobile);
            CREATE INDEX IF NOT EXISTS idx_tickets_purchase_date ON tickets(purchase_date);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(scheme_id) = filter.scheme_id {
            conditions.push("scheme_id = ?");
            params.push(Box::new(scheme_id));
        }

        if let Some(ref mobile) = filter.mobile {
            conditions.push("mobile = ?");
            params.push(Box::new(mobile.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let id: String = row.get(0)?;
        let purchase_date_str: String = row.get(13)?;
        let purchase_date = DateTime::parse_from_rfc3339(&purchase_date_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?;

        Ok(Ticket {
            download_ref: download_ref(&id),
            id,
            scheme_id: row.get(1)?,
            ticket_number: row.get(2)?,
            buyer: BuyerProfile {
                full_name: row.get(3)?,
                mobile: row.get(4)?,
                state: row.get(5)?,
                age: row.get(6)?,
                aadhaar: row.get(7)?,
                email: row.get(8)?,
            },
            amount_paid: row.get(9)?,
            gateway_order_id: row.get(10)?,
            gateway_payment_id: row.get(11)?,
            gateway_signature: row.get(12)?,
            purchase_date,
        })
    }

    fn query_tickets(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Ticket>, TicketError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params, Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    /// Map a UNIQUE violation to the constraint that fired.
    fn insert_error(e: rusqlite::Error, ticket: &NewTicket) -> TicketError {
        if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
            if err.code == ErrorCode::ConstraintViolation {
                if msg.contains("gateway_order_id") {
                    return TicketError::DuplicateOrder(ticket.gateway_order_id.clone());
                }
                if msg.contains("ticket_number") {
                    return TicketError::DuplicateTicketNumber(TicketKey::new(
                        ticket.scheme_id,
                        ticket.ticket_number,
                    ));
                }
            }
        }
        TicketError::Database(e.to_string())
    }
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        let conn = self.lock();

        let id = uuid::Uuid::new_v4().to_string();
        let purchase_date = Utc::now().trunc_subsecs(6);

        conn.execute(
            &format!("INSERT INTO tickets ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                id,
                ticket.scheme_id,
                ticket.ticket_number,
                ticket.buyer.full_name,
                ticket.buyer.mobile,
                ticket.buyer.state,
                ticket.buyer.age,
                ticket.buyer.aadhaar,
                ticket.buyer.email,
                ticket.amount_paid,
                ticket.gateway_order_id,
                ticket.gateway_payment_id,
                ticket.gateway_signature,
                purchase_date.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| Self::insert_error(e, &ticket))?;

        Ok(Ticket {
            download_ref: download_ref(&id),
            id,
            scheme_id: ticket.scheme_id,
            ticket_number: ticket.ticket_number,
            buyer: ticket.buyer,
            amount_paid: ticket.amount_paid,
            gateway_order_id: ticket.gateway_order_id,
            gateway_payment_id: ticket.gateway_payment_id,
            gateway_signature: ticket.gateway_signature,
            purchase_date,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        self.lock()
            .query_row(
                &format!("SELECT {COLUMNS} FROM tickets WHERE id = ?"),
                params![id],
                Self::row_to_ticket,
            )
            .optional()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn find_by_gateway_order(&self, gateway_order_id: &str) -> Result<Option<Ticket>, TicketError> {
        self.lock()
            .query_row(
                &format!("SELECT {COLUMNS} FROM tickets WHERE gateway_order_id = ?"),
                params![gateway_order_id],
                Self::row_to_ticket,
            )
            .optional()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn list_by_mobile(&self, mobile: &str) -> Result<Vec<Ticket>, TicketError> {
        self.list(&TicketFilter::new().with_mobile(mobile))
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.lock();

        let (where_clause, mut params) = Self::build_where_clause(filter);
        let direction = match filter.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM tickets {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            where_clause,
            filter.sort.column(),
            direction
        );

        // SQLite treats a negative LIMIT as unbounded.
        params.push(Box::new(filter.limit.unwrap_or(-1)));
        params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        Self::query_tickets(&conn, &sql, &param_refs)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.lock();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn sold_numbers(&self, scheme_id: SchemeId) -> Result<Vec<u32>, TicketError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT ticket_number FROM tickets WHERE scheme_id = ? ORDER BY ticket_number")
            .map_err(|e| TicketError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![scheme_id], |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<u32>, _>>()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn recent(&self, limit: usize) -> Result<Vec<Ticket>, TicketError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.list(&TicketFilter::new().page(1, limit))
    }

    fn sold_keys(&self) -> Result<Vec<TicketKey>, TicketError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT scheme_id, ticket_number FROM tickets")
            .map_err(|e| TicketError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok(TicketKey::new(row.get(0)?, row.get(1)?)))
            .map_err(|e| TicketError::Database(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TicketError::Database(e.to_string()))
    }
}
