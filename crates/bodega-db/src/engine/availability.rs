//! # Availability Views
//!
//! Read-side queries: what can be sold right now, what a combo costs,
//! and which products have drifted below their minimum. These are
//! display figures computed without locks; checkout re-validates under
//! lock before anything commits, so a stale view can disappoint a
//! customer but never oversell.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bodega_core::{combo, pool, CoreError, ProductKind};

use super::{EngineResult, SettlementEngine};

/// Availability of one product, shaped by its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityView {
    Simple {
        product_id: String,
        sku: String,
        availability: pool::PoolAvailability,
    },
    Combo {
        product_id: String,
        sku: String,
        availability: combo::ComboAvailability,
    },
}

impl AvailabilityView {
    /// Whole sale-units on offer, regardless of kind.
    pub fn available_units(&self) -> Decimal {
        match self {
            AvailabilityView::Simple { availability, .. } => availability.available_sale_units,
            AvailabilityView::Combo { availability, .. } => {
                Decimal::from(availability.available_stock)
            }
        }
    }
}

/// A product whose availability fell below its configured minimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub available_sale_units: Decimal,
    pub stock_minimum: Decimal,
}

impl SettlementEngine {
    /// Current availability of a product, in its own sale units.
    pub async fn availability(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> EngineResult<AvailabilityView> {
        let product = self
            .db
            .products()
            .get_by_id(tenant_id, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        match product.kind {
            ProductKind::Simple => {
                let base_units = self
                    .db
                    .ledger()
                    .current_stock(tenant_id, product.pool_product_id())
                    .await?;
                Ok(AvailabilityView::Simple {
                    availability: pool::availability(&product, base_units),
                    product_id: product.id,
                    sku: product.sku,
                })
            }
            ProductKind::Combo => {
                let stocks = self.component_stocks(tenant_id, &product.id).await?;
                Ok(AvailabilityView::Combo {
                    availability: combo::availability(&stocks),
                    product_id: product.id,
                    sku: product.sku,
                })
            }
        }
    }

    /// Cost and margin report for a combo, from live component averages.
    pub async fn combo_cost(
        &self,
        tenant_id: &str,
        combo_id: &str,
    ) -> EngineResult<combo::ComboCost> {
        let product = self
            .db
            .products()
            .get_by_id(tenant_id, combo_id)
            .await?
            .filter(|p| p.kind == ProductKind::Combo)
            .ok_or_else(|| CoreError::ProductNotFound(combo_id.to_string()))?;

        let stocks = self.component_stocks(tenant_id, &product.id).await?;
        Ok(combo::cost(&stocks, product.price))
    }

    /// Every active simple product sitting below its minimum threshold.
    pub async fn low_stock_report(&self, tenant_id: &str) -> EngineResult<Vec<LowStockAlert>> {
        let products = self.db.products().list_active(tenant_id).await?;
        let ledger = self.db.ledger();

        let mut alerts = Vec::new();
        for product in products {
            let Some(minimum) = product.stock_minimum else {
                continue;
            };
            if product.kind != ProductKind::Simple {
                continue;
            }
            let base_units = ledger
                .current_stock(tenant_id, product.pool_product_id())
                .await?;
            let view = pool::availability(&product, base_units);
            if view.below_minimum {
                alerts.push(LowStockAlert {
                    product_id: product.id,
                    sku: product.sku,
                    name: product.name,
                    available_sale_units: view.available_sale_units,
                    stock_minimum: minimum,
                });
            }
        }
        Ok(alerts)
    }

    /// Loads a combo's components with their live stock and cost, each
    /// expressed in the component's own sale units.
    async fn component_stocks(
        &self,
        tenant_id: &str,
        combo_id: &str,
    ) -> EngineResult<Vec<combo::ComponentStock>> {
        let products = self.db.products();
        let ledger = self.db.ledger();

        let links = products.components_of(combo_id).await?;
        let mut stocks = Vec::with_capacity(links.len());
        for link in links {
            let component = products
                .get_by_id(tenant_id, &link.component_product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(link.component_product_id.clone()))?;
            let base_units = ledger
                .current_stock(tenant_id, component.pool_product_id())
                .await?;
            let base_avg_cost = ledger
                .average_cost(tenant_id, component.pool_product_id())
                .await?;
            stocks.push(combo::ComponentStock {
                current_stock: base_units / component.units_per_sale,
                average_cost: base_avg_cost * component.units_per_sale,
                sale_price: component.price,
                component: link,
            });
        }
        Ok(stocks)
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        receive_stock, seed_combo, seed_presentation, seed_simple_product, test_engine,
    };
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn presentation_availability_floors_whole_units() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let base = seed_simple_product(&db, "t1", "CAN", dec!(1)).await;
        let six_pack = seed_presentation(&db, "t1", "SIXPK", dec!(5), &base, dec!(6)).await;
        receive_stock(&engine, "t1", &base, dec!(20), dec!(0.40)).await;

        let view = engine.availability("t1", &six_pack.id).await.unwrap();
        match view {
            AvailabilityView::Simple { availability, .. } => {
                assert_eq!(availability.base_units, dec!(20));
                // floor(20 / 6) = 3 whole six-packs.
                assert_eq!(availability.available_sale_units, dec!(3));
                assert!(availability.can_sell);
            }
            other => panic!("expected simple view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn combo_view_names_the_binding_component() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let chips = seed_simple_product(&db, "t1", "CHIPS", dec!(2)).await;
        let salsa = seed_simple_product(&db, "t1", "SALSA", dec!(3)).await;
        let (pack, _) = seed_combo(
            &db,
            "t1",
            "PACK",
            dec!(8),
            &[(&chips, dec!(2)), (&salsa, dec!(1))],
        )
        .await;
        receive_stock(&engine, "t1", &chips, dec!(10), dec!(1)).await;
        receive_stock(&engine, "t1", &salsa, dec!(2), dec!(1)).await;

        let view = engine.availability("t1", &pack.id).await.unwrap();
        match view {
            AvailabilityView::Combo { availability, .. } => {
                // min(floor(10/2), floor(2/1)) = 2.
                assert_eq!(availability.available_stock, 2);
                let binding: Vec<_> = availability
                    .components
                    .iter()
                    .filter(|c| c.binding)
                    .map(|c| c.component_product_id.clone())
                    .collect();
                assert_eq!(binding, vec![salsa.id.clone()]);
            }
            other => panic!("expected combo view, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn combo_cost_reports_margin_and_discount() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let a = seed_simple_product(&db, "t1", "A", dec!(3)).await;
        let b = seed_simple_product(&db, "t1", "B", dec!(4)).await;
        let (pack, _) =
            seed_combo(&db, "t1", "AB", dec!(9), &[(&a, dec!(2)), (&b, dec!(1))]).await;
        receive_stock(&engine, "t1", &a, dec!(10), dec!(1)).await;
        receive_stock(&engine, "t1", &b, dec!(10), dec!(2)).await;

        let cost = engine.combo_cost("t1", &pack.id).await.unwrap();
        // cost: 2×1 + 1×2 = 4; parts at price: 2×3 + 1×4 = 10.
        assert_eq!(cost.combo_cost, dec!(4));
        assert_eq!(cost.component_price_sum, dec!(10));
        assert_eq!(cost.implied_discount, dec!(1));
        assert_eq!(cost.margin, dec!(5));
    }

    #[tokio::test]
    async fn low_stock_report_flags_below_minimum_only() {
        let engine = test_engine().await;
        let db = engine.db().clone();

        let mut low = crate::testutil::simple_product("t1", "LOW", dec!(1));
        low.stock_minimum = Some(dec!(5));
        db.products().insert(&low).await.unwrap();

        let mut fine = crate::testutil::simple_product("t1", "FINE", dec!(1));
        fine.stock_minimum = Some(dec!(2));
        db.products().insert(&fine).await.unwrap();

        receive_stock(&engine, "t1", &low, dec!(3), dec!(0.50)).await;
        receive_stock(&engine, "t1", &fine, dec!(6), dec!(0.50)).await;

        let alerts = engine.low_stock_report("t1").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].sku, "LOW");
        assert_eq!(alerts[0].available_sale_units, dec!(3));
        assert_eq!(alerts[0].stock_minimum, dec!(5));
    }
}
