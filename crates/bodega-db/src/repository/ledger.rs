//! # Ledger Repository
//!
//! The append-only stock movement ledger — the single source of truth for
//! quantity and cost.
//!
//! ## The Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append(movement)       the ONLY mutation primitive                    │
//! │  current_stock(...)     Σ(IN qty) − Σ(OUT qty), live, never cached     │
//! │  average_cost(...)      mean unit_cost over costed IN movements        │
//! │                                                                         │
//! │  There is no update. There is no delete. Corrections are made by       │
//! │  appending an opposite-direction entry referencing the same ref.       │
//! │  A counter can drift from history; a sum of history cannot.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantities are stored as TEXT and folded as `Decimal` in Rust: SQLite's
//! `SUM()` over TEXT coerces to float, which is banned from stock math.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::{decimal_col, enum_col, opt_decimal_col};
use bodega_core::{Movement, MovementDirection, MovementReason, NewMovement};

/// Repository for the stock movement ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Current stock of a product: Σ(IN) − Σ(OUT) over its movements.
    ///
    /// Always a live aggregation — no cached counter exists anywhere.
    pub async fn current_stock(&self, tenant_id: &str, product_id: &str) -> DbResult<Decimal> {
        current_stock_with(&self.pool, tenant_id, product_id).await
    }

    /// Transaction-scoped variant of [`Self::current_stock`], used by the
    /// settlement engine so validation reads see transaction state.
    pub async fn current_stock_tx(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Decimal> {
        current_stock_with(conn, tenant_id, product_id).await
    }

    /// Mean `unit_cost` over IN movements that carry a cost; 0 when none.
    pub async fn average_cost(&self, tenant_id: &str, product_id: &str) -> DbResult<Decimal> {
        average_cost_with(&self.pool, tenant_id, product_id).await
    }

    /// Transaction-scoped variant of [`Self::average_cost`].
    pub async fn average_cost_tx(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Decimal> {
        average_cost_with(conn, tenant_id, product_id).await
    }

    /// Appends one immutable movement row.
    pub async fn append(&self, movement: NewMovement) -> DbResult<Movement> {
        let mut conn = self.pool.acquire().await?;
        append_with(&mut conn, movement).await
    }

    /// Appends inside an open transaction.
    pub async fn append_tx(
        &self,
        conn: &mut SqliteConnection,
        movement: NewMovement,
    ) -> DbResult<Movement> {
        append_with(conn, movement).await
    }

    /// Full movement history of a product, oldest first. Read-only view
    /// for history screens and audits.
    pub async fn list_movements(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<Movement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, product_id, direction, reason, qty,
                   unit_cost, ref_type, ref_id, created_at
            FROM stock_movements
            WHERE tenant_id = ?1 AND product_id = ?2
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(movement_from_row).collect()
    }

    /// Every movement written under one originating document, oldest
    /// first. This is what a void replays, so it must see the rows as
    /// they were written, not as the catalog looks today.
    pub async fn list_by_ref(
        &self,
        tenant_id: &str,
        ref_type: &str,
        ref_id: &str,
    ) -> DbResult<Vec<Movement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, product_id, direction, reason, qty,
                   unit_cost, ref_type, ref_id, created_at
            FROM stock_movements
            WHERE tenant_id = ?1 AND ref_type = ?2 AND ref_id = ?3
            ORDER BY created_at, id
            "#,
        )
        .bind(tenant_id)
        .bind(ref_type)
        .bind(ref_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(movement_from_row).collect()
    }
}

// =============================================================================
// Executor-generic primitives
// =============================================================================
// Shared between pool-backed reads and the engine's in-transaction reads.

/// Live stock aggregation over any executor (pool or open transaction).
pub async fn current_stock_with<'e, E>(
    executor: E,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<Decimal>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT direction, qty
        FROM stock_movements
        WHERE tenant_id = ?1 AND product_id = ?2
        "#,
    )
    .bind(tenant_id)
    .bind(product_id)
    .fetch_all(executor)
    .await?;

    let mut total = Decimal::ZERO;
    for row in &rows {
        let direction = enum_col(row, "stock_movements", "direction", MovementDirection::parse)?;
        let qty = decimal_col(row, "stock_movements", "qty")?;
        match direction {
            MovementDirection::In => total += qty,
            MovementDirection::Out => total -= qty,
        }
    }
    Ok(total)
}

/// Average purchase cost over any executor.
pub async fn average_cost_with<'e, E>(
    executor: E,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<Decimal>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT unit_cost
        FROM stock_movements
        WHERE tenant_id = ?1 AND product_id = ?2
          AND direction = 'in' AND unit_cost IS NOT NULL
        "#,
    )
    .bind(tenant_id)
    .bind(product_id)
    .fetch_all(executor)
    .await?;

    if rows.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let mut sum = Decimal::ZERO;
    for row in &rows {
        sum += opt_decimal_col(row, "stock_movements", "unit_cost")?
            .unwrap_or(Decimal::ZERO);
    }
    Ok(sum / Decimal::from(rows.len() as i64))
}

async fn append_with(conn: &mut SqliteConnection, movement: NewMovement) -> DbResult<Movement> {
    if movement.qty <= Decimal::ZERO {
        return Err(DbError::NonPositiveMovement { qty: movement.qty });
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    debug!(
        product_id = %movement.product_id,
        direction = movement.direction.as_str(),
        reason = movement.reason.as_str(),
        qty = %movement.qty,
        "Appending ledger movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, tenant_id, product_id, direction, reason,
            qty, unit_cost, ref_type, ref_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(&movement.tenant_id)
    .bind(&movement.product_id)
    .bind(movement.direction.as_str())
    .bind(movement.reason.as_str())
    .bind(movement.qty.to_string())
    .bind(movement.unit_cost.map(|c| c.to_string()))
    .bind(&movement.ref_type)
    .bind(&movement.ref_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Movement {
        id,
        tenant_id: movement.tenant_id,
        product_id: movement.product_id,
        direction: movement.direction,
        reason: movement.reason,
        qty: movement.qty,
        unit_cost: movement.unit_cost,
        ref_type: movement.ref_type,
        ref_id: movement.ref_id,
        created_at: now,
    })
}

fn movement_from_row(row: &SqliteRow) -> DbResult<Movement> {
    Ok(Movement {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        product_id: row.try_get("product_id")?,
        direction: enum_col(row, "stock_movements", "direction", MovementDirection::parse)?,
        reason: enum_col(row, "stock_movements", "reason", MovementReason::parse)?,
        qty: decimal_col(row, "stock_movements", "qty")?,
        unit_cost: opt_decimal_col(row, "stock_movements", "unit_cost")?,
        ref_type: row.try_get("ref_type")?,
        ref_id: row.try_get("ref_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
