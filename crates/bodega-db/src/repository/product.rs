//! # Product Repository
//!
//! Database operations for products and combo component links.
//!
//! ## Invariants Enforced Here
//! - A combo component must reference a simple product (no nested combos)
//! - A component link must belong to a combo product
//!
//! Stock is deliberately absent from this table: quantity lives only in
//! the movement ledger.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{decimal_col, enum_col, opt_decimal_col};
use bodega_core::{ComboComponent, Product, ProductKind};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product.
    ///
    /// `units_per_sale` must be strictly positive: it is a divisor in
    /// every pool conversion, so a zero here would poison availability
    /// and receipt math for the whole pool.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        if product.units_per_sale <= rust_decimal::Decimal::ZERO {
            return Err(DbError::InvalidProduct(format!(
                "units_per_sale must be positive, got {}",
                product.units_per_sale
            )));
        }

        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, name, kind, price, taxable,
                stock_minimum, base_pool_product_id, units_per_sale,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.kind.as_str())
        .bind(product.price.to_string())
        .bind(product.taxable)
        .bind(product.stock_minimum.map(|m| m.to_string()))
        .bind(&product.base_pool_product_id)
        .bind(product.units_per_sale.to_string())
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by ID, scoped to tenant. Inactive products are
    /// invisible to the engine.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, sku, name, kind, price, taxable,
                   stock_minimum, base_pool_product_id, units_per_sale,
                   is_active, created_at, updated_at
            FROM products
            WHERE tenant_id = ?1 AND id = ?2 AND is_active = 1
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    /// Gets a product by SKU, scoped to tenant.
    pub async fn get_by_sku(&self, tenant_id: &str, sku: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, sku, name, kind, price, taxable,
                   stock_minimum, base_pool_product_id, units_per_sale,
                   is_active, created_at, updated_at
            FROM products
            WHERE tenant_id = ?1 AND sku = ?2 AND is_active = 1
            "#,
        )
        .bind(tenant_id)
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    /// Lists active products for a tenant.
    pub async fn list_active(&self, tenant_id: &str) -> DbResult<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, sku, name, kind, price, taxable,
                   stock_minimum, base_pool_product_id, units_per_sale,
                   is_active, created_at, updated_at
            FROM products
            WHERE tenant_id = ?1 AND is_active = 1
            ORDER BY sku
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    /// Links a component to a combo product.
    ///
    /// Rejects links where the owner is not a combo or the component is
    /// not a simple product — combos never nest.
    pub async fn add_component(
        &self,
        tenant_id: &str,
        combo_id: &str,
        component_product_id: &str,
        qty_per_combo: rust_decimal::Decimal,
    ) -> DbResult<ComboComponent> {
        if qty_per_combo <= rust_decimal::Decimal::ZERO {
            return Err(DbError::InvalidComponent(format!(
                "qty_per_combo must be positive, got {qty_per_combo}"
            )));
        }

        let combo = self
            .get_by_id(tenant_id, combo_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", combo_id))?;
        if combo.kind != ProductKind::Combo {
            return Err(DbError::InvalidComponent(format!(
                "{} is not a combo product",
                combo_id
            )));
        }

        let component = self
            .get_by_id(tenant_id, component_product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", component_product_id))?;
        if component.kind != ProductKind::Simple {
            return Err(DbError::InvalidComponent(format!(
                "component {} must be a simple product",
                component_product_id
            )));
        }

        let link = ComboComponent {
            id: Uuid::new_v4().to_string(),
            combo_id: combo_id.to_string(),
            component_product_id: component_product_id.to_string(),
            qty_per_combo,
        };

        sqlx::query(
            r#"
            INSERT INTO product_components (id, combo_id, component_product_id, qty_per_combo)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&link.id)
        .bind(&link.combo_id)
        .bind(&link.component_product_id)
        .bind(link.qty_per_combo.to_string())
        .execute(&self.pool)
        .await?;

        Ok(link)
    }

    /// Component links of a combo, in insertion order.
    pub async fn components_of(&self, combo_id: &str) -> DbResult<Vec<ComboComponent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, combo_id, component_product_id, qty_per_combo
            FROM product_components
            WHERE combo_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(combo_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ComboComponent {
                    id: sqlx::Row::try_get(row, "id")?,
                    combo_id: sqlx::Row::try_get(row, "combo_id")?,
                    component_product_id: sqlx::Row::try_get(row, "component_product_id")?,
                    qty_per_combo: decimal_col(row, "product_components", "qty_per_combo")?,
                })
            })
            .collect()
    }

    /// Soft-deletes a product.
    pub async fn deactivate(&self, tenant_id: &str, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE products SET is_active = 0, updated_at = ?3
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

fn product_from_row(row: &SqliteRow) -> DbResult<Product> {
    use sqlx::Row;
    Ok(Product {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        kind: enum_col(row, "products", "kind", ProductKind::parse)?,
        price: decimal_col(row, "products", "price")?,
        taxable: row.try_get("taxable")?,
        stock_minimum: opt_decimal_col(row, "products", "stock_minimum")?,
        base_pool_product_id: row.try_get("base_pool_product_id")?,
        units_per_sale: decimal_col(row, "products", "units_per_sale")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
