//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Settlement engine / caller                                             │
//! │       │   db.ledger().current_stock(tenant, product)                    │
//! │       ▼                                                                 │
//! │  Repository (this module) — SQL isolated in one place                   │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods that must run inside the settlement engine's transaction take a
//! `&mut SqliteConnection` (`*_tx` variants); plain methods run against the
//! pool.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - products and combo component links
//! - [`ledger::LedgerRepository`] - the append-only stock movement ledger
//! - [`sale::SaleRepository`] - sale headers and snapshot line items
//! - [`purchase::PurchaseRepository`] - purchase orders (stock receipts)
//! - [`credit::CreditRepository`] - credit instruments and payments
//! - [`settings::SettingsRepository`] - per-tenant key/value settings
//! - [`outbox::OutboxRepository`] - notification outbox

pub mod credit;
pub mod ledger;
pub mod outbox;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod settings;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{DbError, DbResult};

/// Decodes a TEXT decimal column.
pub(crate) fn decimal_col(row: &SqliteRow, table: &str, col: &str) -> DbResult<Decimal> {
    let s: String = row.try_get(col)?;
    s.parse::<Decimal>()
        .map_err(|_| DbError::corrupt(table, col, s))
}

/// Decodes a nullable TEXT decimal column.
pub(crate) fn opt_decimal_col(
    row: &SqliteRow,
    table: &str,
    col: &str,
) -> DbResult<Option<Decimal>> {
    let s: Option<String> = row.try_get(col)?;
    match s {
        Some(s) => s
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| DbError::corrupt(table, col, s)),
        None => Ok(None),
    }
}

/// Decodes a TEXT enum column through a domain parse function.
pub(crate) fn enum_col<T>(
    row: &SqliteRow,
    table: &str,
    col: &str,
    parse: fn(&str) -> Option<T>,
) -> DbResult<T> {
    let s: String = row.try_get(col)?;
    parse(&s).ok_or_else(|| DbError::corrupt(table, col, s))
}
