//! # Validation Module
//!
//! Input validation for the settlement engine's entry points.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (HTTP/CLI surface, out of scope here)                 │
//! │  Layer 2: THIS MODULE - shape checks before any transaction opens      │
//! │  Layer 3: Transactional re-validation under lock (engine)              │
//! │  Layer 4: Database constraints (NOT NULL, UNIQUE, FK)                  │
//! │                                                                         │
//! │  Defense in depth: a bad quantity never reaches the ledger             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a tenant id. The tenant is an explicit required parameter on
/// every core call — never a silent default.
pub fn validate_tenant_id(tenant_id: &str) -> ValidationResult<()> {
    if tenant_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "tenant_id".to_string(),
        });
    }
    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity that must be strictly positive.
///
/// The ledger refuses zero/negative movements outright, so the check also
/// runs here before a transaction is opened.
pub fn validate_positive_qty(field: &str, qty: Decimal) -> ValidationResult<()> {
    if qty <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveQuantity {
            field: field.to_string(),
            value: qty,
        });
    }
    Ok(())
}

/// Validates an amount that must not be negative (unit costs, payments).
pub fn validate_non_negative(field: &str, amount: Decimal) -> ValidationResult<()> {
    if amount < Decimal::ZERO {
        return Err(ValidationError::NegativeAmount {
            field: field.to_string(),
            value: amount,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
