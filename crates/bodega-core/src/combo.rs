//! # Combo Calculator
//!
//! Derives availability and cost for composite products from their
//! component list. Combos never hold stock of their own.
//!
//! ## The Floor Law
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  "Party Pack" = 2× Product A + 1× Product B                             │
//! │                                                                         │
//! │  A stock: 5  →  max from A = floor(5 / 2) = 2                           │
//! │  B stock: 1  →  max from B = floor(1 / 1) = 1                           │
//! │                                                                         │
//! │  available = min(2, 1) = 1     (B is the binding constraint)            │
//! │                                                                         │
//! │  Integer floor division is load-bearing: a combo cannot be              │
//! │  partially assembled.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pure functions over component/stock snapshots; the engine supplies
//! live ledger figures and writes the resulting movements.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ComponentShortfall;
use crate::pool::floor_div;
use crate::types::ComboComponent;

/// A combo component paired with the live state of its stock pool.
#[derive(Debug, Clone)]
pub struct ComponentStock {
    pub component: ComboComponent,
    /// The component's stock, in its own sale units.
    pub current_stock: Decimal,
    /// Average purchase cost per sale unit.
    pub average_cost: Decimal,
    /// Component sale price (for cost reporting only).
    pub sale_price: Decimal,
}

/// Per-component availability detail for user-facing "missing X" messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentAvailability {
    pub component_product_id: String,
    pub qty_per_combo: Decimal,
    pub current_stock: Decimal,
    /// floor(current_stock / qty_per_combo).
    pub max_from_component: i64,
    /// True when this component caps the combo's availability.
    pub binding: bool,
}

/// Full availability picture of a combo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboAvailability {
    pub available_stock: i64,
    pub components: Vec<ComponentAvailability>,
}

/// Result of a pre-commit combo sale check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboValidation {
    pub can_sell: bool,
    pub missing_components: Vec<ComponentShortfall>,
}

/// Cost/margin report for a combo. Reporting only — never used for stock
/// decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboCost {
    /// Σ(component average cost × qty_per_combo).
    pub combo_cost: Decimal,
    /// Σ(component sale price × qty_per_combo).
    pub component_price_sum: Decimal,
    /// What the customer saves buying the combo instead of the parts.
    pub implied_discount: Decimal,
    /// Combo price minus combo cost.
    pub margin: Decimal,
}

/// Number of whole combos assemblable right now.
///
/// `min` over `floor(stock / qty_per_combo)` per component; 0 for an
/// empty component list or any exhausted component.
pub fn available_stock(components: &[ComponentStock]) -> i64 {
    if components.is_empty() {
        return 0;
    }
    components
        .iter()
        .map(max_from_component)
        .min()
        .unwrap_or(0)
}

/// Availability plus the per-component breakdown, flagging binding
/// constraints.
pub fn availability(components: &[ComponentStock]) -> ComboAvailability {
    let available = available_stock(components);
    let detail = components
        .iter()
        .map(|cs| {
            let max = max_from_component(cs);
            ComponentAvailability {
                component_product_id: cs.component.component_product_id.clone(),
                qty_per_combo: cs.component.qty_per_combo,
                current_stock: cs.current_stock,
                max_from_component: max,
                binding: max == available,
            }
        })
        .collect();
    ComboAvailability {
        available_stock: available,
        components: detail,
    }
}

/// Checks whether `requested_qty` combos can be assembled, reporting the
/// shortfall per component that runs short.
pub fn validate_sale(components: &[ComponentStock], requested_qty: Decimal) -> ComboValidation {
    let mut missing = Vec::new();
    for cs in components {
        let required = cs.component.qty_per_combo * requested_qty;
        if required > cs.current_stock {
            missing.push(ComponentShortfall {
                component_product_id: cs.component.component_product_id.clone(),
                required,
                available: cs.current_stock,
            });
        }
    }
    // An empty combo can never sell.
    let can_sell = missing.is_empty() && !components.is_empty();
    ComboValidation {
        can_sell,
        missing_components: missing,
    }
}

/// Cost and margin figures for a combo priced at `combo_price`.
pub fn cost(components: &[ComponentStock], combo_price: Decimal) -> ComboCost {
    let combo_cost: Decimal = components
        .iter()
        .map(|cs| cs.average_cost * cs.component.qty_per_combo)
        .sum();
    let component_price_sum: Decimal = components
        .iter()
        .map(|cs| cs.sale_price * cs.component.qty_per_combo)
        .sum();
    ComboCost {
        combo_cost,
        component_price_sum,
        implied_discount: component_price_sum - combo_price,
        margin: combo_price - combo_cost,
    }
}

fn max_from_component(cs: &ComponentStock) -> i64 {
    floor_div(cs.current_stock, cs.component.qty_per_combo)
        .to_i64()
        .unwrap_or(0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn component_stock(id: &str, qty_per_combo: Decimal, stock: Decimal) -> ComponentStock {
        ComponentStock {
            component: ComboComponent {
                id: format!("link-{id}"),
                combo_id: "combo".into(),
                component_product_id: id.into(),
                qty_per_combo,
            },
            current_stock: stock,
            average_cost: dec!(2),
            sale_price: dec!(5),
        }
    }

    #[test]
    fn floor_law() {
        let components = vec![
            component_stock("a", dec!(3), dec!(10)),
            component_stock("b", dec!(4), dec!(10)),
        ];
        // min(floor(10/3), floor(10/4)) = min(3, 2) = 2
        assert_eq!(available_stock(&components), 2);
    }

    #[test]
    fn empty_combo_has_no_stock() {
        assert_eq!(available_stock(&[]), 0);
        assert!(!validate_sale(&[], dec!(1)).can_sell);
    }

    #[test]
    fn exhausted_component_zeroes_the_combo() {
        let components = vec![
            component_stock("a", dec!(1), dec!(50)),
            component_stock("b", dec!(2), dec!(1)), // floor(1/2) = 0
        ];
        assert_eq!(available_stock(&components), 0);
    }

    #[test]
    fn binding_components_flagged() {
        let components = vec![
            component_stock("a", dec!(2), dec!(5)), // max 2
            component_stock("b", dec!(1), dec!(1)), // max 1 ← binding
        ];
        let a = availability(&components);
        assert_eq!(a.available_stock, 1);
        assert!(!a.components[0].binding);
        assert!(a.components[1].binding);
        assert_eq!(a.components[0].max_from_component, 2);
    }

    #[test]
    fn validate_sale_reports_shortfalls() {
        let components = vec![
            component_stock("a", dec!(2), dec!(5)),
            component_stock("b", dec!(1), dec!(1)),
        ];
        let ok = validate_sale(&components, dec!(1));
        assert!(ok.can_sell);
        assert!(ok.missing_components.is_empty());

        let short = validate_sale(&components, dec!(2));
        assert!(!short.can_sell);
        assert_eq!(short.missing_components.len(), 1);
        let s = &short.missing_components[0];
        assert_eq!(s.component_product_id, "b");
        assert_eq!(s.required, dec!(2));
        assert_eq!(s.available, dec!(1));
    }

    #[test]
    fn cost_and_margin() {
        let components = vec![
            component_stock("a", dec!(2), dec!(10)), // cost 2×2=4, price 5×2=10
            component_stock("b", dec!(1), dec!(10)), // cost 2,    price 5
        ];
        let c = cost(&components, dec!(12));
        assert_eq!(c.combo_cost, dec!(6));
        assert_eq!(c.component_price_sum, dec!(15));
        assert_eq!(c.implied_discount, dec!(3));
        assert_eq!(c.margin, dec!(6));
    }
}
