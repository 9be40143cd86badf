//! # Checkout, Confirmation and Void
//!
//! The sale-side operations of the settlement engine.
//!
//! ## Validation Discipline
//! Stock is validated twice: once implicitly by whatever availability the
//! caller displayed, and once authoritatively here, under the per-product
//! locks, inside the transaction, against a *mutable* remaining-stock map.
//! The map is what makes duplicate lines honest: two lines of the same
//! product accumulate demand instead of validating independently against
//! the same snapshot.
//!
//! ## Deferred Methods
//! Cash and transfer checkouts persist a `Pending` sale with NO ledger
//! movements and queue an outbox notification instead. Stock moves when
//! staff confirm; a pending sale that is never confirmed simply expires
//! with zero ledger effect.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::settings::{TAX_ENABLED_KEY, TAX_RATE_KEY};
use bodega_core::{
    pool, validation, ComboComponent, ComponentShortfall, CoreError, ItemShortfall,
    MovementDirection, MovementReason, NewMovement, PaymentMethod, Product, ProductKind, Sale,
    SaleItem, SaleStatus, TaxConfig, ValidationError,
};

use super::{CheckoutRequest, EngineError, EngineResult, SettlementEngine};

/// Outbox event queued when a deferred sale awaits confirmation.
pub const EVENT_SALE_PENDING: &str = "sale.pending_confirmation";

impl SettlementEngine {
    /// Settles (or defers) a sale.
    ///
    /// Card and credit methods complete immediately: ledger movements are
    /// written and, for credit, an interest-accruing instrument opens in
    /// the same transaction. Cash and transfer create a `Pending` sale
    /// awaiting [`Self::confirm_deferred_sale`].
    #[instrument(skip(self, request), fields(tenant = %tenant_id, method = request.payment_method.as_str()))]
    pub async fn checkout(&self, tenant_id: &str, request: CheckoutRequest) -> EngineResult<Sale> {
        validation::validate_tenant_id(tenant_id)?;
        if request.lines.is_empty() {
            return Err(ValidationError::EmptyLines.into());
        }
        for line in &request.lines {
            validation::validate_positive_qty("quantity", line.quantity)?;
        }
        let credit_terms = match request.payment_method {
            PaymentMethod::Credit => {
                let terms = request.credit_terms.clone().ok_or_else(|| {
                    EngineError::from(ValidationError::Required {
                        field: "credit_terms".into(),
                    })
                })?;
                validation::validate_non_negative("interest_rate", terms.interest_rate)?;
                Some(terms)
            }
            _ => None,
        };

        let lines: Vec<(String, Decimal)> = request
            .lines
            .iter()
            .map(|l| (l.product_id.clone(), l.quantity))
            .collect();
        let plans = self.build_plans(tenant_id, &lines).await?;
        let tax_config = self.resolve_tax(tenant_id).await?;

        let pool_ids = collect_pool_ids(&plans);
        let _locks = self.locks.lock_products(tenant_id, &pool_ids).await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        let mut remaining = load_remaining(&mut tx, tenant_id, &pool_ids).await?;

        let shortfalls = validate_and_consume(&plans, &mut remaining);
        if !shortfalls.is_empty() {
            warn!(count = shortfalls.len(), "Checkout rejected: insufficient stock");
            return Err(CoreError::InsufficientStock { shortfalls }.into());
        }

        let now = Utc::now();
        let deferred = request.payment_method.is_deferred();
        let (subtotal, tax) = totals(&plans, &tax_config);
        let sale = Sale {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            status: if deferred {
                SaleStatus::Pending
            } else {
                SaleStatus::Completed
            },
            payment_method: request.payment_method,
            customer_id: request.customer_id.clone(),
            subtotal,
            tax,
            total: subtotal + tax,
            paid_amount: Decimal::ZERO,
            notes: request.notes.clone(),
            void_reason: None,
            created_at: now,
            completed_at: if deferred { None } else { Some(now) },
            voided_at: None,
        };

        let sales = self.db.sales();
        sales.insert_tx(&mut tx, &sale).await?;
        for plan in &plans {
            sales.insert_item_tx(&mut tx, &plan.snapshot_item(&sale.id)).await?;
        }

        if deferred {
            let payload = serde_json::to_string(&sale)
                .map_err(|e| DbError::Internal(e.to_string()))?;
            self.db
                .outbox()
                .queue_tx(&mut tx, tenant_id, EVENT_SALE_PENDING, &sale.id, &payload)
                .await?;
        } else {
            self.write_sale_movements(&mut tx, tenant_id, &sale.id, &plans)
                .await?;
            if let Some(terms) = credit_terms {
                let instrument = bodega_core::CreditInstrument {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant_id.to_string(),
                    sale_id: Some(sale.id.clone()),
                    customer_id: request.customer_id.clone(),
                    initial_amount: sale.total,
                    interest_amount: Decimal::ZERO,
                    current_balance: sale.total,
                    interest_rate: terms.interest_rate,
                    status: bodega_core::CreditStatus::Active,
                    due_date: terms.due_date,
                    last_interest_calculation_date: now.date_naive(),
                    created_at: now,
                    paid_at: None,
                };
                self.db.credit().insert_tx(&mut tx, &instrument).await?;
            }
        }

        tx.commit().await.map_err(DbError::from)?;
        info!(
            sale_id = %sale.id,
            status = sale.status.as_str(),
            total = %sale.total,
            "Checkout settled"
        );
        Ok(sale)
    }

    /// Confirms a pending (deferred-payment) sale.
    ///
    /// Stock is re-validated under lock against current state, not the
    /// state at checkout time; the shelf may have emptied since.
    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub async fn confirm_deferred_sale(
        &self,
        tenant_id: &str,
        sale_id: &str,
    ) -> EngineResult<Sale> {
        let sales = self.db.sales();
        let mut sale = sales
            .get_by_id(tenant_id, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        if sale.status != SaleStatus::Pending {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                current_status: sale.status.as_str().to_string(),
                operation: "confirm".to_string(),
            }
            .into());
        }

        let items = sales.get_items(sale_id).await?;
        let lines: Vec<(String, Decimal)> = items
            .iter()
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();
        let plans = self.build_plans(tenant_id, &lines).await?;

        let pool_ids = collect_pool_ids(&plans);
        let _locks = self.locks.lock_products(tenant_id, &pool_ids).await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        let mut remaining = load_remaining(&mut tx, tenant_id, &pool_ids).await?;

        let shortfalls = validate_and_consume(&plans, &mut remaining);
        if !shortfalls.is_empty() {
            warn!(sale_id, "Confirmation rejected: stock ran out while pending");
            return Err(CoreError::InsufficientStock { shortfalls }.into());
        }

        let now = Utc::now();
        sales.mark_completed_tx(&mut tx, tenant_id, sale_id, now).await?;
        self.write_sale_movements(&mut tx, tenant_id, sale_id, &plans)
            .await?;

        tx.commit().await.map_err(DbError::from)?;
        info!(sale_id, "Deferred sale confirmed");

        sale.status = SaleStatus::Completed;
        sale.completed_at = Some(now);
        Ok(sale)
    }

    /// Voids a completed sale.
    ///
    /// The original OUT movements are never touched; compensating IN
    /// entries with reason `void` and no unit cost restore the stock,
    /// keeping the average-cost figure a pure purchase average. Any
    /// active credit instrument tied to the sale is cancelled with its
    /// balance left as-is for the audit trail.
    #[instrument(skip(self, reason), fields(tenant = %tenant_id))]
    pub async fn void_sale(
        &self,
        tenant_id: &str,
        sale_id: &str,
        reason: &str,
    ) -> EngineResult<Sale> {
        if reason.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "void_reason".into(),
            }
            .into());
        }

        let sales = self.db.sales();
        let mut sale = sales
            .get_by_id(tenant_id, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        if sale.status != SaleStatus::Completed {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                current_status: sale.status.as_str().to_string(),
                operation: "void".to_string(),
            }
            .into());
        }

        // Reverse the movements the sale actually wrote. The catalog
        // may have changed since checkout (components edited, products
        // deactivated), so replanning from today's product rows would
        // restore the wrong quantities.
        let ledger = self.db.ledger();
        let written = ledger.list_by_ref(tenant_id, "sale", sale_id).await?;
        let mut pool_ids: Vec<String> = written
            .iter()
            .filter(|m| m.direction == MovementDirection::Out)
            .map(|m| m.product_id.clone())
            .collect();
        pool_ids.sort();
        pool_ids.dedup();
        let _locks = self.locks.lock_products(tenant_id, &pool_ids).await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let now = Utc::now();
        sales
            .mark_voided_tx(&mut tx, tenant_id, sale_id, reason, now)
            .await?;

        for movement in written
            .iter()
            .filter(|m| m.direction == MovementDirection::Out)
        {
            ledger
                .append_tx(
                    &mut tx,
                    NewMovement {
                        tenant_id: tenant_id.to_string(),
                        product_id: movement.product_id.clone(),
                        direction: MovementDirection::In,
                        reason: MovementReason::Void,
                        qty: movement.qty,
                        unit_cost: None,
                        ref_type: Some("sale".to_string()),
                        ref_id: Some(sale_id.to_string()),
                    },
                )
                .await?;
        }

        let cancelled = self
            .db
            .credit()
            .cancel_active_by_sale_tx(&mut tx, sale_id)
            .await?;

        tx.commit().await.map_err(DbError::from)?;
        info!(sale_id, credit_cancelled = cancelled, "Sale voided");

        sale.status = SaleStatus::Voided;
        sale.void_reason = Some(reason.to_string());
        sale.voided_at = Some(now);
        Ok(sale)
    }

    // =========================================================================
    // Shared plan machinery
    // =========================================================================

    /// Loads the products (and combo component products) behind a set of
    /// `(product_id, quantity)` lines.
    pub(crate) async fn build_plans(
        &self,
        tenant_id: &str,
        lines: &[(String, Decimal)],
    ) -> EngineResult<Vec<LinePlan>> {
        let products = self.db.products();
        let mut plans = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let product = products
                .get_by_id(tenant_id, product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(product_id.clone()))?;

            let components = match product.kind {
                ProductKind::Simple => Vec::new(),
                ProductKind::Combo => {
                    let links = products.components_of(&product.id).await?;
                    let mut resolved = Vec::with_capacity(links.len());
                    for link in links {
                        let component = products
                            .get_by_id(tenant_id, &link.component_product_id)
                            .await?
                            .ok_or_else(|| {
                                CoreError::ProductNotFound(link.component_product_id.clone())
                            })?;
                        resolved.push((component, link));
                    }
                    resolved
                }
            };

            plans.push(LinePlan {
                product,
                quantity: *quantity,
                components,
            });
        }
        Ok(plans)
    }

    /// Appends the OUT/SALE movements for a validated plan set. Each
    /// movement snapshots the pool's average cost at time of sale.
    async fn write_sale_movements(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        sale_id: &str,
        plans: &[LinePlan],
    ) -> EngineResult<()> {
        let ledger = self.db.ledger();
        for plan in plans {
            for movement in plan.pool_movements() {
                let avg_cost = ledger
                    .average_cost_tx(conn, tenant_id, &movement.product_id)
                    .await?;
                ledger
                    .append_tx(
                        conn,
                        NewMovement {
                            tenant_id: tenant_id.to_string(),
                            product_id: movement.product_id,
                            direction: MovementDirection::Out,
                            reason: MovementReason::Sale,
                            qty: movement.qty,
                            unit_cost: Some(avg_cost),
                            ref_type: Some("sale".to_string()),
                            ref_id: Some(sale_id.to_string()),
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Resolves the tenant's tax configuration from settings.
    ///
    /// Enabled-with-no-rate (or an out-of-range rate) is a hard error,
    /// never a silent zero.
    pub(crate) async fn resolve_tax(&self, tenant_id: &str) -> EngineResult<TaxConfig> {
        let settings = self.db.settings();
        let enabled = settings
            .get_or(tenant_id, TAX_ENABLED_KEY, "false")
            .await?;
        if enabled != "true" && enabled != "1" {
            return Ok(TaxConfig::disabled());
        }

        let raw = settings.get(tenant_id, TAX_RATE_KEY).await?.ok_or_else(|| {
            CoreError::TaxConfig {
                reason: format!("{TAX_RATE_KEY} is not set while tax is enabled"),
            }
        })?;
        let rate: Decimal = raw.parse().map_err(|_| CoreError::TaxConfig {
            reason: format!("{TAX_RATE_KEY} is not a decimal: {raw}"),
        })?;
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(CoreError::TaxConfig {
                reason: format!("{TAX_RATE_KEY} must be a fraction in [0, 1), got {rate}"),
            }
            .into());
        }
        Ok(TaxConfig {
            enabled: true,
            rate: Some(rate),
        })
    }
}

// =============================================================================
// Line plans
// =============================================================================

/// One checkout line with everything loaded that validation and ledger
/// writing need.
#[derive(Debug, Clone)]
pub(crate) struct LinePlan {
    pub product: Product,
    pub quantity: Decimal,
    /// Component products with their links; empty for simple products.
    pub components: Vec<(Product, ComboComponent)>,
}

impl LinePlan {
    /// The pool ledgers this line draws from.
    fn pool_ids(&self) -> Vec<String> {
        match self.product.kind {
            ProductKind::Simple => vec![self.product.pool_product_id().to_string()],
            ProductKind::Combo => self
                .components
                .iter()
                .map(|(p, _)| p.pool_product_id().to_string())
                .collect(),
        }
    }

    /// The resolved base-unit ledger operations this line performs.
    pub(crate) fn pool_movements(&self) -> Vec<pool::PoolMovement> {
        match self.product.kind {
            ProductKind::Simple => vec![pool::resolve_movement(&self.product, self.quantity)],
            ProductKind::Combo => self
                .components
                .iter()
                .map(|(p, link)| pool::resolve_movement(p, link.qty_per_combo * self.quantity))
                .collect(),
        }
    }

    /// The frozen line item persisted with the sale.
    fn snapshot_item(&self, sale_id: &str) -> SaleItem {
        SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            product_id: self.product.id.clone(),
            sku_snapshot: self.product.sku.clone(),
            name_snapshot: self.product.name.clone(),
            unit_price: self.product.price,
            taxable: self.product.taxable,
            quantity: self.quantity,
            line_total: self.product.price * self.quantity,
            created_at: Utc::now(),
        }
    }
}

/// Deduplicated pool ids across a plan set, for the lock pass.
pub(crate) fn collect_pool_ids(plans: &[LinePlan]) -> Vec<String> {
    let mut ids: Vec<String> = plans.iter().flat_map(|p| p.pool_ids()).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Reads current stock of every involved pool into a mutable map, inside
/// the open transaction.
pub(crate) async fn load_remaining(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    pool_ids: &[String],
) -> DbResult<HashMap<String, Decimal>> {
    let mut remaining = HashMap::with_capacity(pool_ids.len());
    for pool_id in pool_ids {
        let stock = crate::repository::ledger::current_stock_with(
            &mut *conn, tenant_id, pool_id,
        )
        .await?;
        remaining.insert(pool_id.clone(), stock);
    }
    Ok(remaining)
}

/// Validates every line against `remaining`, consuming stock as lines
/// pass so duplicate-product lines accumulate demand. Returns one
/// shortfall per failing line; an empty vec means the whole set fits.
pub(crate) fn validate_and_consume(
    plans: &[LinePlan],
    remaining: &mut HashMap<String, Decimal>,
) -> Vec<ItemShortfall> {
    let mut shortfalls = Vec::new();

    for plan in plans {
        match plan.product.kind {
            ProductKind::Simple => {
                let pool_id = plan.product.pool_product_id().to_string();
                let base = remaining.get(&pool_id).copied().unwrap_or(Decimal::ZERO);
                let check = pool::validate_quantity(&plan.product, base, plan.quantity);
                if check.can_sell {
                    *remaining.entry(pool_id).or_insert(Decimal::ZERO) -=
                        plan.quantity * plan.product.units_per_sale;
                } else {
                    let view = pool::availability(&plan.product, base);
                    shortfalls.push(ItemShortfall {
                        product_id: plan.product.id.clone(),
                        sku: plan.product.sku.clone(),
                        requested: plan.quantity,
                        available: view.available_sale_units,
                        missing_components: Vec::new(),
                    });
                }
            }
            ProductKind::Combo => {
                // Components that are presentations over the SAME pool
                // must be checked against one shared budget, so demand is
                // accumulated per pool id in base units, never validated
                // per component against an independent snapshot.
                let mut demand: HashMap<String, Decimal> = HashMap::new();
                let mut missing = Vec::new();
                for (component, link) in &plan.components {
                    let pool_id = component.pool_product_id().to_string();
                    let required_base =
                        plan.quantity * link.qty_per_combo * component.units_per_sale;
                    let claimed = demand.get(&pool_id).copied().unwrap_or(Decimal::ZERO);
                    let base_left = remaining.get(&pool_id).copied().unwrap_or(Decimal::ZERO)
                        - claimed;
                    if required_base > base_left {
                        missing.push(ComponentShortfall {
                            component_product_id: component.id.clone(),
                            required: plan.quantity * link.qty_per_combo,
                            available: base_left.max(Decimal::ZERO)
                                / component.units_per_sale,
                        });
                    }
                    *demand.entry(pool_id).or_insert(Decimal::ZERO) += required_base;
                }

                // An empty combo can never sell.
                if missing.is_empty() && !plan.components.is_empty() {
                    for (pool_id, base_qty) in demand {
                        *remaining.entry(pool_id).or_insert(Decimal::ZERO) -= base_qty;
                    }
                } else {
                    shortfalls.push(ItemShortfall {
                        product_id: plan.product.id.clone(),
                        sku: plan.product.sku.clone(),
                        requested: plan.quantity,
                        available: combos_assemblable(&demand, plan.quantity, remaining),
                        missing_components: missing,
                    });
                }
            }
        }
    }

    shortfalls
}

/// Whole combos the remaining stock could still assemble, given the
/// per-pool base-unit demand of `requested` combos. The reported figure
/// honors shared pools: min over pools of floor(stock / per-combo draw).
fn combos_assemblable(
    demand: &HashMap<String, Decimal>,
    requested: Decimal,
    remaining: &HashMap<String, Decimal>,
) -> Decimal {
    if requested <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    demand
        .iter()
        .map(|(pool_id, total_base)| {
            let per_combo = total_base / requested;
            if per_combo <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            let stock = remaining.get(pool_id).copied().unwrap_or(Decimal::ZERO);
            (stock / per_combo).floor().max(Decimal::ZERO)
        })
        .min()
        .unwrap_or(Decimal::ZERO)
}

/// Sale totals from the plan set and tax configuration.
fn totals(plans: &[LinePlan], tax_config: &TaxConfig) -> (Decimal, Decimal) {
    let mut subtotal = Decimal::ZERO;
    let mut taxable_subtotal = Decimal::ZERO;
    for plan in plans {
        let line_total = plan.product.price * plan.quantity;
        subtotal += line_total;
        if plan.product.taxable {
            taxable_subtotal += line_total;
        }
    }
    let tax = match (tax_config.enabled, tax_config.rate) {
        (true, Some(rate)) => (taxable_subtotal * rate).round_dp(2),
        _ => Decimal::ZERO,
    };
    (subtotal, tax)
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CheckoutLine, CreditTerms};
    use crate::testutil::{
        checkout_request, receive_stock, seed_combo, seed_presentation, seed_simple_product,
        test_engine,
    };
    use bodega_core::CreditStatus;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn card_checkout_settles_immediately() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "COLA", dec!(2.50)).await;
        receive_stock(&engine, "t1", &p, dec!(10), dec!(1.00)).await;

        let sale = engine
            .checkout("t1", checkout_request(&[(&p, dec!(3))], PaymentMethod::Card))
            .await
            .unwrap();

        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.subtotal, dec!(7.50));
        assert_eq!(sale.total, dec!(7.50));
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(7));

        // Items are frozen snapshots.
        let items = db.sales().get_items(&sale.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].sku_snapshot, "COLA");
        assert_eq!(items[0].unit_price, dec!(2.50));

        // The OUT movement snapshots the average cost.
        let history = db.ledger().list_movements("t1", &p.id).await.unwrap();
        let sale_row = history.last().unwrap();
        assert_eq!(sale_row.reason, MovementReason::Sale);
        assert_eq!(sale_row.unit_cost, Some(dec!(1.00)));
        assert_eq!(sale_row.ref_id.as_deref(), Some(sale.id.as_str()));
    }

    #[tokio::test]
    async fn presentations_draw_from_one_pool() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let base = seed_simple_product(&db, "t1", "COLA-CAN", dec!(1.00)).await;
        let six_pack = seed_presentation(&db, "t1", "COLA-6PK", dec!(5.50), &base, dec!(6)).await;
        receive_stock(&engine, "t1", &base, dec!(20), dec!(0.40)).await;

        engine
            .checkout(
                "t1",
                checkout_request(&[(&six_pack, dec!(2))], PaymentMethod::Card),
            )
            .await
            .unwrap();

        // 2 six-packs consumed 12 cans from the shared pool. The
        // presentation itself never accumulates movements.
        assert_eq!(
            db.ledger().current_stock("t1", &base.id).await.unwrap(),
            dec!(8)
        );
        assert!(db
            .ledger()
            .list_movements("t1", &six_pack.id)
            .await
            .unwrap()
            .is_empty());

        // 8 cans left: a third six-pack no longer fits.
        let err = engine
            .checkout(
                "t1",
                checkout_request(&[(&six_pack, dec!(2))], PaymentMethod::Card),
            )
            .await
            .unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock { shortfalls }) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].requested, dec!(2));
                assert_eq!(shortfalls[0].available, dec!(1));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn combo_availability_is_bounded_by_scarcest_component() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let chips = seed_simple_product(&db, "t1", "CHIPS", dec!(2)).await;
        let salsa = seed_simple_product(&db, "t1", "SALSA", dec!(3)).await;
        let (pack, _) = seed_combo(
            &db,
            "t1",
            "PARTY-PACK",
            dec!(8),
            &[(&chips, dec!(2)), (&salsa, dec!(1))],
        )
        .await;
        receive_stock(&engine, "t1", &chips, dec!(5), dec!(1)).await;
        receive_stock(&engine, "t1", &salsa, dec!(1), dec!(1)).await;

        // One pack fits (2 chips + 1 salsa).
        engine
            .checkout("t1", checkout_request(&[(&pack, dec!(1))], PaymentMethod::Card))
            .await
            .unwrap();
        assert_eq!(db.ledger().current_stock("t1", &chips.id).await.unwrap(), dec!(3));
        assert_eq!(db.ledger().current_stock("t1", &salsa.id).await.unwrap(), dec!(0));

        // Salsa is exhausted; the second pack names it as the binding
        // shortfall even though chips remain.
        let err = engine
            .checkout("t1", checkout_request(&[(&pack, dec!(1))], PaymentMethod::Card))
            .await
            .unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock { shortfalls }) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].missing_components.len(), 1);
                assert_eq!(
                    shortfalls[0].missing_components[0].component_product_id,
                    salsa.id
                );
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn combo_components_sharing_a_pool_share_its_budget() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let can = seed_simple_product(&db, "t1", "COLA-CAN", dec!(1.00)).await;
        let six_pack = seed_presentation(&db, "t1", "COLA-6PK", dec!(5.50), &can, dec!(6)).await;
        // One combo drains 1 + 6 = 7 cans from the same pool.
        let (bundle, _) = seed_combo(
            &db,
            "t1",
            "CAN-AND-SIX",
            dec!(6.00),
            &[(&can, dec!(1)), (&six_pack, dec!(1))],
        )
        .await;
        receive_stock(&engine, "t1", &can, dec!(6), dec!(0.40)).await;

        // Each component alone fits in 6 cans; together they do not.
        let err = engine
            .checkout(
                "t1",
                checkout_request(&[(&bundle, dec!(1))], PaymentMethod::Card),
            )
            .await
            .unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock { shortfalls }) => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].available, dec!(0));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(db.ledger().current_stock("t1", &can.id).await.unwrap(), dec!(6));

        // A seventh can makes the bundle assemblable exactly once.
        receive_stock(&engine, "t1", &can, dec!(1), dec!(0.40)).await;
        engine
            .checkout(
                "t1",
                checkout_request(&[(&bundle, dec!(1))], PaymentMethod::Card),
            )
            .await
            .unwrap();
        assert_eq!(db.ledger().current_stock("t1", &can.id).await.unwrap(), dec!(0));
    }

    #[tokio::test]
    async fn duplicate_lines_accumulate_demand() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "SODA", dec!(1)).await;
        receive_stock(&engine, "t1", &p, dec!(5), dec!(0.50)).await;

        // 3 + 3 = 6 > 5, even though each line alone would fit.
        let request = CheckoutRequest {
            lines: vec![
                CheckoutLine {
                    product_id: p.id.clone(),
                    quantity: dec!(3),
                },
                CheckoutLine {
                    product_id: p.id.clone(),
                    quantity: dec!(3),
                },
            ],
            payment_method: PaymentMethod::Card,
            customer_id: None,
            credit_terms: None,
            notes: None,
        };
        let err = engine.checkout("t1", request).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { .. })
        ));
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn deferred_cash_sale_moves_no_stock_until_confirmed() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "BREAD", dec!(1.20)).await;
        receive_stock(&engine, "t1", &p, dec!(4), dec!(0.60)).await;

        let sale = engine
            .checkout("t1", checkout_request(&[(&p, dec!(2))], PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(4));

        // The notification committed with the sale.
        let pending = db.outbox().list_pending("t1", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, EVENT_SALE_PENDING);
        assert_eq!(pending[0].entity_id, sale.id);

        let confirmed = engine.confirm_deferred_sale("t1", &sale.id).await.unwrap();
        assert_eq!(confirmed.status, SaleStatus::Completed);
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(2));

        // Confirming twice is a status error, not a double movement.
        let err = engine.confirm_deferred_sale("t1", &sale.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InvalidSaleStatus { .. })
        ));
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn confirmation_revalidates_against_current_stock() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "MILK", dec!(2)).await;
        receive_stock(&engine, "t1", &p, dec!(3), dec!(1)).await;

        let pending = engine
            .checkout("t1", checkout_request(&[(&p, dec!(3))], PaymentMethod::Cash))
            .await
            .unwrap();

        // Stock runs out while the sale waits; pending sales reserve nothing.
        engine
            .checkout("t1", checkout_request(&[(&p, dec!(2))], PaymentMethod::Card))
            .await
            .unwrap();

        let err = engine
            .confirm_deferred_sale("t1", &pending.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock { .. })
        ));

        // Still pending and the remaining stock is intact.
        let reloaded = db.sales().get_by_id("t1", &pending.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SaleStatus::Pending);
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(1));
    }

    #[tokio::test]
    async fn void_restores_stock_without_touching_average_cost() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "WINE", dec!(15)).await;
        receive_stock(&engine, "t1", &p, dec!(6), dec!(8)).await;

        let sale = engine
            .checkout("t1", checkout_request(&[(&p, dec!(2))], PaymentMethod::Card))
            .await
            .unwrap();
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(4));

        let voided = engine.void_sale("t1", &sale.id, "damaged goods").await.unwrap();
        assert_eq!(voided.status, SaleStatus::Voided);
        assert_eq!(voided.void_reason.as_deref(), Some("damaged goods"));
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(6));

        // The compensating entry is IN/void with no cost, so the average
        // stays the purchase average.
        assert_eq!(db.ledger().average_cost("t1", &p.id).await.unwrap(), dec!(8));
        let history = db.ledger().list_movements("t1", &p.id).await.unwrap();
        let void_row = history.last().unwrap();
        assert_eq!(void_row.reason, MovementReason::Void);
        assert_eq!(void_row.unit_cost, None);

        // Voiding twice fails; the ledger is untouched.
        let err = engine.void_sale("t1", &sale.id, "again").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InvalidSaleStatus { .. })
        ));
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(6));
    }

    #[tokio::test]
    async fn void_replays_the_ledger_even_after_deactivation() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "SEASONAL", dec!(9)).await;
        receive_stock(&engine, "t1", &p, dec!(5), dec!(4)).await;
        let sale = engine
            .checkout("t1", checkout_request(&[(&p, dec!(2))], PaymentMethod::Card))
            .await
            .unwrap();

        // The product is retired between the sale and the void; the
        // compensating entries come from the written movements, not a
        // fresh catalog lookup.
        db.products().deactivate("t1", &p.id).await.unwrap();
        engine.void_sale("t1", &sale.id, "returned").await.unwrap();
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn void_ignores_components_added_after_the_sale() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let chips = seed_simple_product(&db, "t1", "CHIPS", dec!(2)).await;
        let dip = seed_simple_product(&db, "t1", "DIP", dec!(3)).await;
        let (pack, _) = seed_combo(&db, "t1", "SNACK-PACK", dec!(4), &[(&chips, dec!(1))]).await;
        receive_stock(&engine, "t1", &chips, dec!(3), dec!(1)).await;
        receive_stock(&engine, "t1", &dip, dec!(3), dec!(1)).await;

        let sale = engine
            .checkout("t1", checkout_request(&[(&pack, dec!(1))], PaymentMethod::Card))
            .await
            .unwrap();
        assert_eq!(db.ledger().current_stock("t1", &chips.id).await.unwrap(), dec!(2));

        // The recipe grows after the sale. Voiding the old sale must
        // not conjure stock for a component it never consumed.
        db.products()
            .add_component("t1", &pack.id, &dip.id, dec!(1))
            .await
            .unwrap();
        engine.void_sale("t1", &sale.id, "wrong order").await.unwrap();
        assert_eq!(db.ledger().current_stock("t1", &chips.id).await.unwrap(), dec!(3));
        assert_eq!(db.ledger().current_stock("t1", &dip.id).await.unwrap(), dec!(3));
        assert!(db
            .ledger()
            .list_movements("t1", &dip.id)
            .await
            .unwrap()
            .iter()
            .all(|m| m.reason != MovementReason::Void));
    }

    #[tokio::test]
    async fn tax_applies_to_taxable_lines_only() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let taxed = seed_simple_product(&db, "t1", "BEER", dec!(10)).await;
        let mut exempt = crate::testutil::simple_product("t1", "RICE", dec!(4));
        exempt.taxable = false;
        db.products().insert(&exempt).await.unwrap();
        receive_stock(&engine, "t1", &taxed, dec!(5), dec!(4)).await;
        receive_stock(&engine, "t1", &exempt, dec!(5), dec!(2)).await;

        db.settings().set("t1", TAX_ENABLED_KEY, "true").await.unwrap();
        db.settings().set("t1", TAX_RATE_KEY, "0.16").await.unwrap();

        let sale = engine
            .checkout(
                "t1",
                checkout_request(
                    &[(&taxed, dec!(1)), (&exempt, dec!(1))],
                    PaymentMethod::Card,
                ),
            )
            .await
            .unwrap();
        assert_eq!(sale.subtotal, dec!(14));
        assert_eq!(sale.tax, dec!(1.60));
        assert_eq!(sale.total, dec!(15.60));
    }

    #[tokio::test]
    async fn tax_enabled_without_rate_is_a_hard_failure() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "GIN", dec!(20)).await;
        receive_stock(&engine, "t1", &p, dec!(2), dec!(10)).await;

        db.settings().set("t1", TAX_ENABLED_KEY, "true").await.unwrap();

        let err = engine
            .checkout("t1", checkout_request(&[(&p, dec!(1))], PaymentMethod::Card))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::TaxConfig { .. })));
        // Nothing committed.
        assert_eq!(db.ledger().current_stock("t1", &p.id).await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn credit_checkout_opens_an_instrument() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "TV", dec!(300)).await;
        receive_stock(&engine, "t1", &p, dec!(2), dec!(180)).await;

        let request = CheckoutRequest {
            lines: vec![CheckoutLine {
                product_id: p.id.clone(),
                quantity: dec!(1),
            }],
            payment_method: PaymentMethod::Credit,
            customer_id: Some("cust-9".into()),
            credit_terms: Some(CreditTerms {
                interest_rate: dec!(0.001),
                due_date: None,
            }),
            notes: None,
        };
        let sale = engine.checkout("t1", request).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Completed);

        let instruments = db.credit().get_by_sale(&sale.id).await.unwrap();
        assert_eq!(instruments.len(), 1);
        let instrument = &instruments[0];
        assert_eq!(instrument.status, CreditStatus::Active);
        assert_eq!(instrument.initial_amount, dec!(300));
        assert_eq!(instrument.current_balance, dec!(300));
        assert_eq!(instrument.customer_id.as_deref(), Some("cust-9"));
    }

    #[tokio::test]
    async fn credit_without_terms_is_rejected() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "FAN", dec!(25)).await;
        receive_stock(&engine, "t1", &p, dec!(1), dec!(12)).await;

        let request = CheckoutRequest {
            lines: vec![CheckoutLine {
                product_id: p.id.clone(),
                quantity: dec!(1),
            }],
            payment_method: PaymentMethod::Credit,
            customer_id: None,
            credit_terms: None,
            notes: None,
        };
        let err = engine.checkout("t1", request).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[tokio::test]
    async fn voiding_a_credit_sale_cancels_the_instrument() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "SOFA", dec!(500)).await;
        receive_stock(&engine, "t1", &p, dec!(1), dec!(250)).await;

        let request = CheckoutRequest {
            lines: vec![CheckoutLine {
                product_id: p.id.clone(),
                quantity: dec!(1),
            }],
            payment_method: PaymentMethod::Credit,
            customer_id: None,
            credit_terms: Some(CreditTerms {
                interest_rate: dec!(0.002),
                due_date: None,
            }),
            notes: None,
        };
        let sale = engine.checkout("t1", request).await.unwrap();

        engine.void_sale("t1", &sale.id, "returned").await.unwrap();

        let instruments = db.credit().get_by_sale(&sale.id).await.unwrap();
        assert_eq!(instruments[0].status, CreditStatus::Cancelled);
        // Balance is preserved for the audit trail.
        assert_eq!(instruments[0].current_balance, dec!(500));
    }

    #[tokio::test]
    async fn concurrent_checkouts_never_oversell() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "LAST-ONE", dec!(9)).await;
        receive_stock(&engine, "t1", &p, dec!(1), dec!(5)).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let request = checkout_request(&[(&p, dec!(1))], PaymentMethod::Card);
            handles.push(tokio::spawn(
                async move { engine.checkout("t1", request).await },
            ));
        }

        let mut completed = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => completed += 1,
                Err(EngineError::Core(CoreError::InsufficientStock { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(rejected, 3);
        assert_eq!(
            db.ledger().current_stock("t1", &p.id).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn empty_and_non_positive_requests_fail_fast() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let p = seed_simple_product(&db, "t1", "EGGS", dec!(3)).await;

        let empty = CheckoutRequest {
            lines: vec![],
            payment_method: PaymentMethod::Card,
            customer_id: None,
            credit_terms: None,
            notes: None,
        };
        assert!(matches!(
            engine.checkout("t1", empty).await.unwrap_err(),
            EngineError::Core(CoreError::Validation(ValidationError::EmptyLines))
        ));

        let zero = checkout_request(&[(&p, dec!(0))], PaymentMethod::Card);
        assert!(matches!(
            engine.checkout("t1", zero).await.unwrap_err(),
            EngineError::Core(CoreError::Validation(
                ValidationError::NonPositiveQuantity { .. }
            ))
        ));
    }
}
