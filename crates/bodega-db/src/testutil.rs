//! Shared fixtures for repository and engine tests.
//!
//! Everything runs against an in-memory database (single connection, WAL
//! off), so tests are hermetic and parallel-safe.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::engine::{CheckoutLine, CheckoutRequest, PurchaseLine, PurchaseRequest, SettlementEngine};
use crate::pool::{Database, DbConfig};
use bodega_core::{ComboComponent, PaymentMethod, Product, ProductKind};

/// Fresh migrated in-memory database.
pub async fn test_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// Fresh engine over its own in-memory database.
pub async fn test_engine() -> SettlementEngine {
    SettlementEngine::new(test_db().await)
}

/// A simple, taxable, unit-per-sale product. Not yet persisted.
pub fn simple_product(tenant_id: &str, sku: &str, price: Decimal) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        sku: sku.to_string(),
        name: format!("{sku} (test)"),
        kind: ProductKind::Simple,
        price,
        taxable: true,
        stock_minimum: None,
        base_pool_product_id: None,
        units_per_sale: dec!(1),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts and returns a simple product.
pub async fn seed_simple_product(
    db: &Database,
    tenant_id: &str,
    sku: &str,
    price: Decimal,
) -> Product {
    let product = simple_product(tenant_id, sku, price);
    db.products().insert(&product).await.expect("insert product");
    product
}

/// Inserts a presentation over `base`'s stock pool.
pub async fn seed_presentation(
    db: &Database,
    tenant_id: &str,
    sku: &str,
    price: Decimal,
    base: &Product,
    units_per_sale: Decimal,
) -> Product {
    let mut product = simple_product(tenant_id, sku, price);
    product.base_pool_product_id = Some(base.id.clone());
    product.units_per_sale = units_per_sale;
    db.products()
        .insert(&product)
        .await
        .expect("insert presentation");
    product
}

/// Inserts a combo and links the given `(component, qty_per_combo)` pairs.
pub async fn seed_combo(
    db: &Database,
    tenant_id: &str,
    sku: &str,
    price: Decimal,
    components: &[(&Product, Decimal)],
) -> (Product, Vec<ComboComponent>) {
    let mut combo = simple_product(tenant_id, sku, price);
    combo.kind = ProductKind::Combo;
    db.products().insert(&combo).await.expect("insert combo");

    let mut links = Vec::with_capacity(components.len());
    for (component, qty) in components {
        let link = db
            .products()
            .add_component(tenant_id, &combo.id, &component.id, *qty)
            .await
            .expect("link component");
        links.push(link);
    }
    (combo, links)
}

/// Receives `quantity` sale-units of `product` at `unit_cost` through the
/// engine, so the IN movement is costed the way production receipts are.
pub async fn receive_stock(
    engine: &SettlementEngine,
    tenant_id: &str,
    product: &Product,
    quantity: Decimal,
    unit_cost: Decimal,
) {
    engine
        .receive_purchase(
            tenant_id,
            PurchaseRequest {
                supplier_id: None,
                lines: vec![PurchaseLine {
                    product_id: product.id.clone(),
                    quantity,
                    unit_cost,
                }],
                notes: None,
            },
        )
        .await
        .expect("receive stock");
}

/// A card-style checkout request over `(product, quantity)` pairs.
pub fn checkout_request(
    lines: &[(&Product, Decimal)],
    payment_method: PaymentMethod,
) -> CheckoutRequest {
    CheckoutRequest {
        lines: lines
            .iter()
            .map(|(product, quantity)| CheckoutLine {
                product_id: product.id.clone(),
                quantity: *quantity,
            })
            .collect(),
        payment_method,
        customer_id: None,
        credit_terms: None,
        notes: None,
    }
}
