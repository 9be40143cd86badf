//! # Credit Repository
//!
//! Persistence for credit instruments and their payment records.
//!
//! Balance mutation happens in two places only: interest accrual and
//! payment application, both orchestrated by the engine inside a
//! transaction and persisted through [`CreditRepository::update_balance_tx`].
//! Payment rows themselves are immutable.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{decimal_col, enum_col};
use bodega_core::{CreditInstrument, CreditPayment, CreditStatus, PaymentMethod};

/// Repository for credit instrument database operations.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
}

impl CreditRepository {
    /// Creates a new CreditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CreditRepository { pool }
    }

    /// Inserts a credit instrument inside an open transaction.
    pub async fn insert_tx(
        &self,
        conn: &mut SqliteConnection,
        instrument: &CreditInstrument,
    ) -> DbResult<()> {
        debug!(
            id = %instrument.id,
            sale_id = ?instrument.sale_id,
            balance = %instrument.current_balance,
            "Inserting credit instrument"
        );

        sqlx::query(
            r#"
            INSERT INTO credit_instruments (
                id, tenant_id, sale_id, customer_id,
                initial_amount, interest_amount, current_balance, interest_rate,
                status, due_date, last_interest_calculation_date,
                created_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&instrument.id)
        .bind(&instrument.tenant_id)
        .bind(&instrument.sale_id)
        .bind(&instrument.customer_id)
        .bind(instrument.initial_amount.to_string())
        .bind(instrument.interest_amount.to_string())
        .bind(instrument.current_balance.to_string())
        .bind(instrument.interest_rate.to_string())
        .bind(instrument.status.as_str())
        .bind(instrument.due_date)
        .bind(instrument.last_interest_calculation_date)
        .bind(instrument.created_at)
        .bind(instrument.paid_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets an instrument by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CreditInstrument>> {
        let row = sqlx::query(INSTRUMENT_SELECT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(instrument_from_row).transpose()
    }

    /// Transaction-scoped variant of [`Self::get_by_id`].
    pub async fn get_by_id_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CreditInstrument>> {
        let row = sqlx::query(INSTRUMENT_SELECT)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(instrument_from_row).transpose()
    }

    /// Instruments originated by a sale.
    pub async fn get_by_sale(&self, sale_id: &str) -> DbResult<Vec<CreditInstrument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, sale_id, customer_id,
                   initial_amount, interest_amount, current_balance, interest_rate,
                   status, due_date, last_interest_calculation_date,
                   created_at, paid_at
            FROM credit_instruments
            WHERE sale_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(instrument_from_row).collect()
    }

    /// Persists the mutable accrual/payment state of an instrument,
    /// inside an open transaction.
    pub async fn update_balance_tx(
        &self,
        conn: &mut SqliteConnection,
        instrument: &CreditInstrument,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE credit_instruments SET
                interest_amount = ?2,
                current_balance = ?3,
                last_interest_calculation_date = ?4,
                status = ?5,
                paid_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&instrument.id)
        .bind(instrument.interest_amount.to_string())
        .bind(instrument.current_balance.to_string())
        .bind(instrument.last_interest_calculation_date)
        .bind(instrument.status.as_str())
        .bind(instrument.paid_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CreditInstrument", &instrument.id));
        }
        Ok(())
    }

    /// Cancels every ACTIVE instrument tied to a sale, inside an open
    /// transaction. Balances are left untouched. Returns how many were
    /// cancelled.
    pub async fn cancel_active_by_sale_tx(
        &self,
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE credit_instruments SET status = 'cancelled'
            WHERE sale_id = ?1 AND status = 'active'
            "#,
        )
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Inserts an immutable payment record inside an open transaction.
    pub async fn insert_payment_tx(
        &self,
        conn: &mut SqliteConnection,
        payment: &CreditPayment,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_payments (id, instrument_id, amount, method, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.instrument_id)
        .bind(payment.amount.to_string())
        .bind(payment.method.as_str())
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Payment history for an instrument, oldest first.
    pub async fn list_payments(&self, instrument_id: &str) -> DbResult<Vec<CreditPayment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, instrument_id, amount, method, created_at
            FROM credit_payments
            WHERE instrument_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}

const INSTRUMENT_SELECT: &str = r#"
    SELECT id, tenant_id, sale_id, customer_id,
           initial_amount, interest_amount, current_balance, interest_rate,
           status, due_date, last_interest_calculation_date,
           created_at, paid_at
    FROM credit_instruments
    WHERE id = ?1
"#;

fn instrument_from_row(row: &SqliteRow) -> DbResult<CreditInstrument> {
    Ok(CreditInstrument {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        sale_id: row.try_get("sale_id")?,
        customer_id: row.try_get("customer_id")?,
        initial_amount: decimal_col(row, "credit_instruments", "initial_amount")?,
        interest_amount: decimal_col(row, "credit_instruments", "interest_amount")?,
        current_balance: decimal_col(row, "credit_instruments", "current_balance")?,
        interest_rate: decimal_col(row, "credit_instruments", "interest_rate")?,
        status: enum_col(row, "credit_instruments", "status", CreditStatus::parse)?,
        due_date: row.try_get::<Option<NaiveDate>, _>("due_date")?,
        last_interest_calculation_date: row
            .try_get::<NaiveDate, _>("last_interest_calculation_date")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        paid_at: row.try_get::<Option<DateTime<Utc>>, _>("paid_at")?,
    })
}

fn payment_from_row(row: &SqliteRow) -> DbResult<CreditPayment> {
    Ok(CreditPayment {
        id: row.try_get("id")?,
        instrument_id: row.try_get("instrument_id")?,
        amount: decimal_col(row, "credit_payments", "amount")?,
        method: enum_col(row, "credit_payments", "method", PaymentMethod::parse)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
