//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Pending   (deferred payment, awaiting confirmation; NO movements)   │
//! │  2. Completed (settled; OUT/SALE movements written by the engine)       │
//! │  3. Voided    (reversed; IN/VOID compensating movements written)        │
//! │                                                                         │
//! │  Status transitions are gated in SQL (`WHERE status = …`) with a        │
//! │  rows_affected check, so a lost race surfaces as an error instead of    │
//! │  a silent double transition.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All writes run inside the settlement engine's transaction; this
//! repository never opens one of its own.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{decimal_col, enum_col};
use bodega_core::{PaymentMethod, Sale, SaleItem, SaleStatus};

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID, scoped to tenant.
    pub async fn get_by_id(&self, tenant_id: &str, id: &str) -> DbResult<Option<Sale>> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, status, payment_method, customer_id,
                   subtotal, tax, total, paid_amount, notes, void_reason,
                   created_at, completed_at, voided_at
            FROM sales
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(sale_from_row).transpose()
    }

    /// Inserts a sale header inside an open transaction.
    pub async fn insert_tx(&self, conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, status = sale.status.as_str(), "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, tenant_id, status, payment_method, customer_id,
                subtotal, tax, total, paid_amount, notes, void_reason,
                created_at, completed_at, voided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.tenant_id)
        .bind(sale.status.as_str())
        .bind(sale.payment_method.as_str())
        .bind(&sale.customer_id)
        .bind(sale.subtotal.to_string())
        .bind(sale.tax.to_string())
        .bind(sale.total.to_string())
        .bind(sale.paid_amount.to_string())
        .bind(&sale.notes)
        .bind(&sale.void_reason)
        .bind(sale.created_at)
        .bind(sale.completed_at)
        .bind(sale.voided_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts a snapshot line item inside an open transaction.
    pub async fn insert_item_tx(
        &self,
        conn: &mut SqliteConnection,
        item: &SaleItem,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, sku_snapshot, name_snapshot,
                unit_price, taxable, quantity, line_total, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.unit_price.to_string())
        .bind(item.taxable)
        .bind(item.quantity.to_string())
        .bind(item.line_total.to_string())
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets all items for a sale.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sale_id, product_id, sku_snapshot, name_snapshot,
                   unit_price, taxable, quantity, line_total, created_at
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    /// Transitions a pending sale to completed, inside an open transaction.
    ///
    /// Gated on `status = 'pending'`: confirming a sale that was already
    /// confirmed (or voided) is an error, not a second transition.
    pub async fn mark_completed_tx(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        sale_id: &str,
        completed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'completed', completed_at = ?3
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'pending'
            "#,
        )
        .bind(tenant_id)
        .bind(sale_id)
        .bind(completed_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (pending)", sale_id));
        }
        Ok(())
    }

    /// Transitions a completed sale to voided, inside an open transaction.
    pub async fn mark_voided_tx(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        sale_id: &str,
        reason: &str,
        voided_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'voided', void_reason = ?3, voided_at = ?4
            WHERE tenant_id = ?1 AND id = ?2 AND status = 'completed'
            "#,
        )
        .bind(tenant_id)
        .bind(sale_id)
        .bind(reason)
        .bind(voided_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (completed)", sale_id));
        }
        Ok(())
    }

    /// Overwrites the credit-payment bookkeeping total, inside an open
    /// transaction. The new figure is computed in Rust because the column
    /// is exact-decimal TEXT.
    pub async fn set_paid_amount_tx(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
        paid_amount: rust_decimal::Decimal,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE sales SET paid_amount = ?2 WHERE id = ?1")
            .bind(sale_id)
            .bind(paid_amount.to_string())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", sale_id));
        }
        Ok(())
    }
}

fn sale_from_row(row: &SqliteRow) -> DbResult<Sale> {
    Ok(Sale {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        status: enum_col(row, "sales", "status", SaleStatus::parse)?,
        payment_method: enum_col(row, "sales", "payment_method", PaymentMethod::parse)?,
        customer_id: row.try_get("customer_id")?,
        subtotal: decimal_col(row, "sales", "subtotal")?,
        tax: decimal_col(row, "sales", "tax")?,
        total: decimal_col(row, "sales", "total")?,
        paid_amount: decimal_col(row, "sales", "paid_amount")?,
        notes: row.try_get("notes")?,
        void_reason: row.try_get("void_reason")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        voided_at: row.try_get::<Option<DateTime<Utc>>, _>("voided_at")?,
    })
}

fn item_from_row(row: &SqliteRow) -> DbResult<SaleItem> {
    Ok(SaleItem {
        id: row.try_get("id")?,
        sale_id: row.try_get("sale_id")?,
        product_id: row.try_get("product_id")?,
        sku_snapshot: row.try_get("sku_snapshot")?,
        name_snapshot: row.try_get("name_snapshot")?,
        unit_price: decimal_col(row, "sale_items", "unit_price")?,
        taxable: row.try_get("taxable")?,
        quantity: decimal_col(row, "sale_items", "quantity")?,
        line_total: decimal_col(row, "sale_items", "line_total")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
