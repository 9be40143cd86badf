//! # Error Types
//!
//! Domain-specific error types for bodega-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bodega-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bodega-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - Settlement engine (wraps Core + Db)            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, shortfall amounts)
//! 3. Errors are enum variants, never String
//! 4. The engine never partially commits: every error means "nothing
//!    happened, here is why"

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Shortfall payload
// =============================================================================

/// One line item's stock shortfall, reported when a checkout is rejected.
///
/// Carried on [`CoreError::InsufficientStock`] so callers can render an
/// actionable "requested vs available" message per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemShortfall {
    pub product_id: String,
    pub sku: String,
    /// Sale-units requested.
    pub requested: Decimal,
    /// Sale-units actually available at validation time.
    pub available: Decimal,
    /// For combos: the binding component(s) that ran short.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_components: Vec<ComponentShortfall>,
}

/// A combo component that cannot cover the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentShortfall {
    pub component_product_id: String,
    /// Component sale-units the request needs.
    pub required: Decimal,
    /// Component sale-units currently available.
    pub available: Decimal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product id does not exist (or is inactive) for the tenant.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Stock cannot cover the requested quantities.
    ///
    /// Raised after lock + re-validation; the transaction is rolled back
    /// and `shortfalls` lists every failing line.
    #[error("Insufficient stock for {} item(s)", shortfalls.len())]
    InsufficientStock { shortfalls: Vec<ItemShortfall> },

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Sale is not in a state that allows the requested transition.
    ///
    /// Voiding a voided sale, confirming a completed sale, and so on.
    #[error("Sale {sale_id} is {current_status}, cannot {operation}")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
        operation: String,
    },

    /// Tax is enabled but the rate setting is missing or out of range.
    ///
    /// Surfaced distinctly from stock errors so operators know to fix
    /// settings, not inventory. Never defaulted to zero.
    #[error("Tax configuration invalid: {reason}")]
    TaxConfig { reason: String },

    /// Credit instrument not found.
    #[error("Credit instrument not found: {0}")]
    CreditNotFound(String),

    /// Payment attempted on a paid or cancelled instrument.
    #[error("Credit instrument {instrument_id} is {status}, no further payments accepted")]
    CreditNotActive {
        instrument_id: String,
        status: String,
    },

    /// Payment exceeds the current balance. Never clamped or partially
    /// applied.
    #[error("Payment {requested} exceeds balance {balance}")]
    Overpayment {
        requested: Decimal,
        balance: Decimal,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any transaction is opened — fully local, no partial state.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Quantity must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    NonPositiveQuantity { field: String, value: Decimal },

    /// An amount that must not be negative.
    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: String, value: Decimal },

    /// A request with no line items.
    #[error("at least one line item is required")]
    EmptyLines,

    /// Field value has an invalid format.
    #[error("{field} is invalid: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
