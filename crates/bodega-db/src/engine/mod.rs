//! # Settlement Engine
//!
//! The transactional orchestrator over the movement ledger. Checkout,
//! confirmation, void, stock receipt and credit payment all run here, and
//! nothing else writes sale-driven ledger movements.
//!
//! ## Anatomy of a Settlement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout(request)                                                      │
//! │                                                                         │
//! │   1. validate input            (local, no transaction)                 │
//! │   2. load products + combos    (pool reads)                            │
//! │   3. LOCK involved pools       (sorted, deduplicated)                  │
//! │   4. BEGIN                                                             │
//! │   5. re-read stock, validate   (every line, duplicates accumulated)    │
//! │   6. insert sale + items       (snapshot pattern)                      │
//! │   7. append OUT movements      (immediate methods only)                │
//! │   8. open credit instrument    (credit method only)                    │
//! │   9. COMMIT, then unlock                                               │
//! │                                                                         │
//! │  Any failure between 4 and 9 rolls the whole transaction back:         │
//! │  every error means "nothing happened, here is why".                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are acquired before the transaction opens and released after
//! commit, so validation reads and the writes they justify are atomic
//! with respect to competing checkouts.

pub mod availability;
pub mod checkout;
pub mod credit;
pub mod locks;
pub mod purchase;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DbError;
use crate::pool::Database;
use bodega_core::{CoreError, CreditInstrument, CreditPayment, ValidationError};

pub use availability::{AvailabilityView, LowStockAlert};
pub use locks::ProductLocks;

// =============================================================================
// Error type
// =============================================================================

/// Errors surfaced by the settlement engine.
///
/// Wraps the two layers below it; callers match on `Core` for business
/// rejections (insufficient stock, bad status) and `Db` for
/// infrastructure failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(e))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Request DTOs
// =============================================================================

/// One line of a checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: String,
    /// Sale-units requested. Fractional quantities are allowed (weighed
    /// goods), but must be strictly positive.
    pub quantity: Decimal,
}

/// Credit terms attached to a credit-method checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTerms {
    /// Fractional daily rate, e.g. `0.001` = 0.1% per day.
    pub interest_rate: Decimal,
    /// Informational due date; nothing gates on it.
    pub due_date: Option<NaiveDate>,
}

/// A checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub lines: Vec<CheckoutLine>,
    pub payment_method: bodega_core::PaymentMethod,
    pub customer_id: Option<String>,
    /// Required when `payment_method` is credit, ignored otherwise.
    pub credit_terms: Option<CreditTerms>,
    pub notes: Option<String>,
}

/// One line of a stock receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: String,
    /// Sale-units received.
    pub quantity: Decimal,
    /// Cost per sale-unit as invoiced by the supplier.
    pub unit_cost: Decimal,
}

/// A supplier stock receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub supplier_id: Option<String>,
    pub lines: Vec<PurchaseLine>,
    pub notes: Option<String>,
}

/// Outcome of a credit payment.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// Instrument state after accrual and payment.
    pub instrument: CreditInstrument,
    /// The immutable payment record written.
    pub payment: CreditPayment,
    /// True when this payment settled the instrument.
    pub settled: bool,
}

// =============================================================================
// Engine handle
// =============================================================================

/// The settlement engine.
///
/// Cheap to clone; clones share the database pool and the lock registry.
/// All engine handles in a process MUST come from clones of one engine,
/// otherwise the per-product locks would not be shared.
#[derive(Debug, Clone)]
pub struct SettlementEngine {
    pub(crate) db: Database,
    pub(crate) locks: ProductLocks,
}

impl SettlementEngine {
    /// Creates an engine over a database handle.
    pub fn new(db: Database) -> Self {
        SettlementEngine {
            db,
            locks: ProductLocks::new(),
        }
    }

    /// The underlying database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }
}
