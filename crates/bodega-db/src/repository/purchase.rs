//! # Purchase Repository
//!
//! Purchase orders record stock receipts from suppliers. The ledger
//! entries themselves (`IN`/`PURCHASE` movements) are written by the
//! settlement engine in the same transaction as these rows.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::decimal_col;
use bodega_core::{PurchaseItem, PurchaseOrder};

/// Repository for purchase order database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Inserts a purchase order header inside an open transaction.
    pub async fn insert_tx(
        &self,
        conn: &mut SqliteConnection,
        order: &PurchaseOrder,
    ) -> DbResult<()> {
        debug!(id = %order.id, supplier = ?order.supplier_id, "Inserting purchase order");

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, tenant_id, supplier_id, total_cost, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.supplier_id)
        .bind(order.total_cost.to_string())
        .bind(&order.notes)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a purchase line item inside an open transaction.
    pub async fn insert_item_tx(
        &self,
        conn: &mut SqliteConnection,
        item: &PurchaseItem,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (
                id, purchase_id, product_id, quantity, unit_cost, line_cost
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.purchase_id)
        .bind(&item.product_id)
        .bind(item.quantity.to_string())
        .bind(item.unit_cost.to_string())
        .bind(item.line_cost.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets a purchase order by ID, scoped to tenant.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<PurchaseOrder>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, supplier_id, total_cost, notes, created_at
            FROM purchase_orders
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    /// Gets all items for a purchase order.
    pub async fn get_items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, purchase_id, product_id, quantity, unit_cost, line_cost
            FROM purchase_items
            WHERE purchase_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }
}

fn order_from_row(row: &SqliteRow) -> DbResult<PurchaseOrder> {
    Ok(PurchaseOrder {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        supplier_id: row.try_get("supplier_id")?,
        total_cost: decimal_col(row, "purchase_orders", "total_cost")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> DbResult<PurchaseItem> {
    Ok(PurchaseItem {
        id: row.try_get("id")?,
        purchase_id: row.try_get("purchase_id")?,
        product_id: row.try_get("product_id")?,
        quantity: decimal_col(row, "purchase_items", "quantity")?,
        unit_cost: decimal_col(row, "purchase_items", "unit_cost")?,
        line_cost: decimal_col(row, "purchase_items", "line_cost")?,
    })
}
