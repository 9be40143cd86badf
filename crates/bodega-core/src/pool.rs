//! # Pool Resolver
//!
//! Maps sellable presentations onto the shared pool product whose ledger
//! actually holds the stock.
//!
//! ## Why Pools?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               One Pool, Many Presentations                              │
//! │                                                                         │
//! │   "Bottle 330ml"  units_per_sale = 1  ┐                                 │
//! │   "Six pack"      units_per_sale = 6  ├──► pool: "Cola base"            │
//! │   "Case"          units_per_sale = 24 ┘        (the only ledger)        │
//! │                                                                         │
//! │   Presentations are conversion factors over a shared pool, not         │
//! │   separate inventories. A case and a bottle of the same liquid draw    │
//! │   from one ledger, so stock can never double count.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every ledger writer (sale, purchase, void) resolves through this module
//! so presentation products never accumulate movement rows of their own.
//!
//! These are pure functions: the caller supplies the pool's current stock
//! (`base_units`), obtained from the ledger store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Product;

/// A resolved ledger operation: which product's ledger moves, and by how
/// many base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMovement {
    pub product_id: String,
    pub qty: Decimal,
}

/// Availability of a presentation, expressed in its own sale units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAvailability {
    /// Raw stock of the pool product.
    pub base_units: Decimal,
    /// floor(base_units / units_per_sale) — whole sale-units on offer.
    pub available_sale_units: Decimal,
    pub can_sell: bool,
    /// True when availability has dropped below the product's
    /// stock-minimum threshold.
    pub below_minimum: bool,
}

/// Result of a pre-commit quantity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolValidation {
    pub can_sell: bool,
    /// Base units short of the request; zero when the sale fits.
    pub missing_base_units: Decimal,
}

/// Resolves a sale/purchase of `sale_qty` units of `product` into the
/// ledger operation it actually performs.
///
/// Presentations return their pool product id and `sale_qty ×
/// units_per_sale`; pool-owning products pass through unchanged.
pub fn resolve_movement(product: &Product, sale_qty: Decimal) -> PoolMovement {
    match &product.base_pool_product_id {
        Some(base_id) => PoolMovement {
            product_id: base_id.clone(),
            qty: sale_qty * product.units_per_sale,
        },
        None => PoolMovement {
            product_id: product.id.clone(),
            qty: sale_qty,
        },
    }
}

/// Computes the sale-unit availability of `product` given its pool's
/// current stock.
///
/// This is the figure displayed to end users and used for below-minimum
/// alerts. Display-time availability can be stale by the time a write
/// happens, which is why [`validate_quantity`] runs again under lock
/// immediately before a sale commits.
pub fn availability(product: &Product, base_units: Decimal) -> PoolAvailability {
    let available_sale_units = floor_div(base_units, product.units_per_sale);
    let below_minimum = match product.stock_minimum {
        Some(min) => available_sale_units < min,
        None => false,
    };
    PoolAvailability {
        base_units,
        available_sale_units,
        can_sell: available_sale_units > Decimal::ZERO,
        below_minimum,
    }
}

/// Checks whether `requested_sale_qty` units of `product` fit in the
/// pool's current stock.
pub fn validate_quantity(
    product: &Product,
    base_units: Decimal,
    requested_sale_qty: Decimal,
) -> PoolValidation {
    let required_base_units = requested_sale_qty * product.units_per_sale;
    if required_base_units <= base_units {
        PoolValidation {
            can_sell: true,
            missing_base_units: Decimal::ZERO,
        }
    } else {
        PoolValidation {
            can_sell: false,
            missing_base_units: required_base_units - base_units,
        }
    }
}

/// floor(a / b), with zero and negative denominators yielding zero stock.
///
/// `units_per_sale` is validated positive at product creation; the guard
/// keeps arithmetic total anyway.
pub(crate) fn floor_div(a: Decimal, b: Decimal) -> Decimal {
    if b <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (a / b).floor()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn product(base_pool: Option<&str>, units_per_sale: Decimal) -> Product {
        Product {
            id: "pres".into(),
            tenant_id: "t1".into(),
            sku: "PRES-1".into(),
            name: "Presentation".into(),
            kind: ProductKind::Simple,
            price: dec!(25),
            taxable: false,
            stock_minimum: Some(dec!(2)),
            base_pool_product_id: base_pool.map(String::from),
            units_per_sale,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn resolve_identity_without_pool() {
        let p = product(None, dec!(1));
        let m = resolve_movement(&p, dec!(3));
        assert_eq!(m.product_id, "pres");
        assert_eq!(m.qty, dec!(3));
    }

    #[test]
    fn resolve_converts_to_base_units() {
        let p = product(Some("pool"), dec!(6));
        let m = resolve_movement(&p, dec!(2));
        assert_eq!(m.product_id, "pool");
        assert_eq!(m.qty, dec!(12));
    }

    #[test]
    fn availability_floors_sale_units() {
        let p = product(Some("pool"), dec!(6));
        let a = availability(&p, dec!(20));
        assert_eq!(a.base_units, dec!(20));
        assert_eq!(a.available_sale_units, dec!(3)); // floor(20/6)
        assert!(a.can_sell);
    }

    #[test]
    fn availability_below_minimum_flag() {
        let p = product(Some("pool"), dec!(6));
        // floor(7/6) = 1 < stock_minimum 2
        let a = availability(&p, dec!(7));
        assert!(a.below_minimum);
        assert!(a.can_sell);

        // floor(1/6) = 0
        let a = availability(&p, dec!(1));
        assert!(!a.can_sell);
        assert_eq!(a.available_sale_units, Decimal::ZERO);
    }

    #[test]
    fn validate_quantity_reports_missing_base_units() {
        let p = product(Some("pool"), dec!(6));

        // 3 × 6 = 18 base units fit in 20
        let v = validate_quantity(&p, dec!(20), dec!(3));
        assert!(v.can_sell);
        assert_eq!(v.missing_base_units, Decimal::ZERO);

        // 4 × 6 = 24 base units do not
        let v = validate_quantity(&p, dec!(20), dec!(4));
        assert!(!v.can_sell);
        assert_eq!(v.missing_base_units, dec!(4));
    }
}
