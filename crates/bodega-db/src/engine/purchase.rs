//! # Stock Receipt and Manual Corrections
//!
//! The IN side of the ledger. A purchase receipt writes the order rows
//! and their `IN`/`PURCHASE` movements in one transaction; the movement
//! carries the per-base-unit cost, which is what feeds the average-cost
//! figure.
//!
//! Costs are invoiced per sale-unit but the ledger is kept in base
//! units, so a presentation receipt divides: a case of 24 invoiced at
//! 24.00 lands as 24 base units at 1.00 each.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::DbError;
use bodega_core::{
    pool, validation, CoreError, ItemShortfall, MovementDirection, MovementReason, NewMovement,
    Product, ProductKind, PurchaseItem, PurchaseOrder, ValidationError,
};

use super::{EngineResult, PurchaseRequest, SettlementEngine};

impl SettlementEngine {
    /// Receives a supplier purchase: order rows plus one `IN`/`PURCHASE`
    /// ledger movement per line, atomically.
    #[instrument(skip(self, request), fields(tenant = %tenant_id))]
    pub async fn receive_purchase(
        &self,
        tenant_id: &str,
        request: PurchaseRequest,
    ) -> EngineResult<PurchaseOrder> {
        validation::validate_tenant_id(tenant_id)?;
        if request.lines.is_empty() {
            return Err(ValidationError::EmptyLines.into());
        }
        for line in &request.lines {
            validation::validate_positive_qty("quantity", line.quantity)?;
            validation::validate_non_negative("unit_cost", line.unit_cost)?;
        }

        // Combos never hold stock; only simple products can be received.
        let products_repo = self.db.products();
        let mut resolved: Vec<(Product, Decimal, Decimal)> = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = products_repo
                .get_by_id(tenant_id, &line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            if product.kind == ProductKind::Combo {
                return Err(ValidationError::InvalidFormat {
                    field: "product_id".into(),
                    reason: format!("{} is a combo and cannot receive stock", product.sku),
                }
                .into());
            }
            resolved.push((product, line.quantity, line.unit_cost));
        }

        let pool_ids: Vec<String> = {
            let mut ids: Vec<String> = resolved
                .iter()
                .map(|(p, _, _)| p.pool_product_id().to_string())
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let _locks = self.locks.lock_products(tenant_id, &pool_ids).await;

        let now = Utc::now();
        let order = PurchaseOrder {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            supplier_id: request.supplier_id.clone(),
            total_cost: resolved.iter().map(|(_, qty, cost)| qty * cost).sum(),
            notes: request.notes.clone(),
            created_at: now,
        };

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let purchases = self.db.purchases();
        purchases.insert_tx(&mut tx, &order).await?;

        let ledger = self.db.ledger();
        for (product, quantity, unit_cost) in &resolved {
            let movement = pool::resolve_movement(product, *quantity);
            // The line stays in sale units as invoiced; only the ledger
            // entry is converted to base units.
            let base_unit_cost = unit_cost / product.units_per_sale;

            purchases
                .insert_item_tx(
                    &mut tx,
                    &PurchaseItem {
                        id: Uuid::new_v4().to_string(),
                        purchase_id: order.id.clone(),
                        product_id: product.id.clone(),
                        quantity: *quantity,
                        unit_cost: *unit_cost,
                        line_cost: quantity * unit_cost,
                    },
                )
                .await?;

            ledger
                .append_tx(
                    &mut tx,
                    NewMovement {
                        tenant_id: tenant_id.to_string(),
                        product_id: movement.product_id,
                        direction: MovementDirection::In,
                        reason: MovementReason::Purchase,
                        qty: movement.qty,
                        unit_cost: Some(base_unit_cost),
                        ref_type: Some("purchase".to_string()),
                        ref_id: Some(order.id.clone()),
                    },
                )
                .await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        info!(
            purchase_id = %order.id,
            lines = resolved.len(),
            total_cost = %order.total_cost,
            "Purchase received"
        );
        Ok(order)
    }

    /// Appends a manual stock correction (physical count drift, found
    /// stock). Quantity is in the product's sale units; direction decides
    /// the sign. Downward corrections cannot take the pool below zero.
    #[instrument(skip(self, note), fields(tenant = %tenant_id))]
    pub async fn adjust_stock(
        &self,
        tenant_id: &str,
        product_id: &str,
        direction: MovementDirection,
        quantity: Decimal,
        note: Option<&str>,
    ) -> EngineResult<bodega_core::Movement> {
        self.outbound_correction(
            tenant_id,
            product_id,
            direction,
            MovementReason::Adjust,
            quantity,
            note,
        )
        .await
    }

    /// Records spoilage, breakage or shrinkage as an `OUT`/`WASTE` entry.
    #[instrument(skip(self, note), fields(tenant = %tenant_id))]
    pub async fn record_waste(
        &self,
        tenant_id: &str,
        product_id: &str,
        quantity: Decimal,
        note: Option<&str>,
    ) -> EngineResult<bodega_core::Movement> {
        self.outbound_correction(
            tenant_id,
            product_id,
            MovementDirection::Out,
            MovementReason::Waste,
            quantity,
            note,
        )
        .await
    }

    async fn outbound_correction(
        &self,
        tenant_id: &str,
        product_id: &str,
        direction: MovementDirection,
        reason: MovementReason,
        quantity: Decimal,
        note: Option<&str>,
    ) -> EngineResult<bodega_core::Movement> {
        validation::validate_tenant_id(tenant_id)?;
        validation::validate_positive_qty("quantity", quantity)?;

        let product = self
            .db
            .products()
            .get_by_id(tenant_id, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        if product.kind == ProductKind::Combo {
            return Err(ValidationError::InvalidFormat {
                field: "product_id".into(),
                reason: format!("{} is a combo and holds no stock", product.sku),
            }
            .into());
        }

        let movement = pool::resolve_movement(&product, quantity);
        let _locks = self
            .locks
            .lock_products(tenant_id, [movement.product_id.as_str()])
            .await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let ledger = self.db.ledger();
        if direction == MovementDirection::Out {
            let stock = ledger
                .current_stock_tx(&mut tx, tenant_id, &movement.product_id)
                .await?;
            if movement.qty > stock {
                let view = pool::availability(&product, stock);
                return Err(CoreError::InsufficientStock {
                    shortfalls: vec![ItemShortfall {
                        product_id: product.id.clone(),
                        sku: product.sku.clone(),
                        requested: quantity,
                        available: view.available_sale_units,
                        missing_components: Vec::new(),
                    }],
                }
                .into());
            }
        }

        let written = ledger
            .append_tx(
                &mut tx,
                NewMovement {
                    tenant_id: tenant_id.to_string(),
                    product_id: movement.product_id,
                    direction,
                    reason,
                    qty: movement.qty,
                    unit_cost: None,
                    ref_type: note.map(|_| "note".to_string()),
                    ref_id: note.map(|n| n.to_string()),
                },
            )
            .await?;

        tx.commit().await.map_err(DbError::from)?;
        info!(
            product_id = %written.product_id,
            direction = direction.as_str(),
            reason = reason.as_str(),
            qty = %written.qty,
            "Stock correction recorded"
        );
        Ok(written)
    }
}

// =============================================================================
// Integration Tests
// =============================================================================
