//! # bodega-db: Persistence and Settlement for Bodega
//!
//! SQLite persistence for the movement ledger, products, sales, purchases
//! and credit, plus the transactional settlement engine that orchestrates
//! them.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         bodega-db                                       │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │  engine: SettlementEngine                                         │ │
//! │  │   checkout / confirm / void / receive / pay_credit / availability │ │
//! │  │   per-product locks + one transaction per operation               │ │
//! │  └───────────────────────────┬───────────────────────────────────────┘ │
//! │                              │                                          │
//! │  ┌───────────────────────────▼───────────────────────────────────────┐ │
//! │  │  repository: ledger, product, sale, purchase, credit,             │ │
//! │  │              settings, outbox                                     │ │
//! │  └───────────────────────────┬───────────────────────────────────────┘ │
//! │                              │                                          │
//! │  ┌───────────────────────────▼───────────────────────────────────────┐ │
//! │  │  pool: SqlitePool (WAL, foreign keys)   migrations: embedded      │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("/var/lib/bodega/bodega.db")).await?;
//! let engine = SettlementEngine::new(db);
//!
//! let sale = engine.checkout("tenant-1", request).await?;
//! ```
//!
//! Exact-decimal columns are stored as TEXT and folded in Rust; floats
//! never touch stock or money.

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{
    AvailabilityView, CheckoutLine, CheckoutRequest, CreditTerms, EngineError, EngineResult,
    LowStockAlert, PaymentOutcome, PurchaseLine, PurchaseRequest, SettlementEngine,
};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::credit::CreditRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::PurchaseRepository;
pub use repository::sale::SaleRepository;
pub use repository::settings::SettingsRepository;
