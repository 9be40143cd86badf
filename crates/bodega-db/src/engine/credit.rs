//! # Credit Servicing
//!
//! Interest on a credit instrument is lazy: nothing runs on a schedule.
//! Every read or payment first brings the balance up to date with
//! [`bodega_core::credit::accrue`] (idempotent per day), then acts on the
//! accrued figure. Both paths persist the accrual, so two reads on the
//! same day cost nothing twice.
//!
//! Payments are two records in one transaction: the immutable payment row
//! and the updated instrument state. Overpayment rolls the whole thing
//! back.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::DbError;
use bodega_core::{credit, validation, CoreError, CreditInstrument, CreditPayment, PaymentMethod};

use super::{EngineResult, PaymentOutcome, SettlementEngine};

impl SettlementEngine {
    /// Applies a payment against a credit instrument.
    ///
    /// Interest is accrued up to today before the payment lands, so a
    /// payment can never be applied to a stale balance. A residual within
    /// the settlement epsilon closes the instrument as paid.
    #[instrument(skip(self), fields(tenant = %tenant_id))]
    pub async fn pay_credit(
        &self,
        tenant_id: &str,
        instrument_id: &str,
        amount: Decimal,
        method: PaymentMethod,
    ) -> EngineResult<PaymentOutcome> {
        validation::validate_tenant_id(tenant_id)?;
        validation::validate_positive_qty("amount", amount)?;

        // One payment at a time per instrument: the registry serializes on
        // an instrument-scoped key, so reads taken before the transaction
        // opens cannot be raced by another payment.
        let lock_key = format!("credit:{instrument_id}");
        let _locks = self.locks.lock_products(tenant_id, [lock_key.as_str()]).await;

        let credit_repo = self.db.credit();
        let mut instrument = credit_repo
            .get_by_id(instrument_id)
            .await?
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::CreditNotFound(instrument_id.to_string()))?;

        let now = Utc::now();
        credit::accrue(&mut instrument, now.date_naive());

        let payment = CreditPayment {
            id: Uuid::new_v4().to_string(),
            instrument_id: instrument.id.clone(),
            amount,
            method,
            created_at: now,
        };
        let settled = credit::apply_payment(&mut instrument, amount)?;
        if settled {
            instrument.paid_at = Some(now);
        }

        let originating_sale = match instrument.sale_id.clone() {
            Some(sale_id) => self.db.sales().get_by_id(tenant_id, &sale_id).await?,
            None => None,
        };

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        credit_repo.insert_payment_tx(&mut tx, &payment).await?;
        credit_repo.update_balance_tx(&mut tx, &instrument).await?;

        // Mirror the running total onto the originating sale.
        if let Some(sale) = originating_sale {
            self.db
                .sales()
                .set_paid_amount_tx(&mut tx, &sale.id, sale.paid_amount + amount)
                .await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        info!(
            instrument_id = %instrument.id,
            amount = %amount,
            balance = %instrument.current_balance,
            settled,
            "Credit payment applied"
        );
        Ok(PaymentOutcome {
            instrument,
            payment,
            settled,
        })
    }

    /// Fetches a credit instrument with interest accrued up to today.
    /// The accrual is persisted, so the stored balance never lags a
    /// balance a caller has already been shown.
    pub async fn get_credit_instrument(
        &self,
        tenant_id: &str,
        instrument_id: &str,
    ) -> EngineResult<CreditInstrument> {
        self.accrued_instrument(tenant_id, instrument_id, Utc::now().date_naive())
            .await
    }

    /// Accrual-on-read with an explicit date. Exposed for backdated
    /// statements and exercised directly by tests.
    pub async fn accrue_credit_to(
        &self,
        tenant_id: &str,
        instrument_id: &str,
        as_of: NaiveDate,
    ) -> EngineResult<CreditInstrument> {
        self.accrued_instrument(tenant_id, instrument_id, as_of).await
    }

    async fn accrued_instrument(
        &self,
        tenant_id: &str,
        instrument_id: &str,
        as_of: NaiveDate,
    ) -> EngineResult<CreditInstrument> {
        let lock_key = format!("credit:{instrument_id}");
        let _locks = self.locks.lock_products(tenant_id, [lock_key.as_str()]).await;

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let credit_repo = self.db.credit();
        let mut instrument = credit_repo
            .get_by_id_tx(&mut tx, instrument_id)
            .await?
            .filter(|i| i.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::CreditNotFound(instrument_id.to_string()))?;

        let accrual = credit::accrue(&mut instrument, as_of);
        if accrual.days > 0 {
            credit_repo.update_balance_tx(&mut tx, &instrument).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        Ok(instrument)
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        CheckoutLine, CheckoutRequest, CreditTerms, EngineError,
    };
    use crate::testutil::{receive_stock, seed_simple_product, test_engine};
    use bodega_core::{CreditStatus, SaleStatus, ValidationError};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn credit_sale(
        engine: &SettlementEngine,
        tenant: &str,
        price: Decimal,
        rate: Decimal,
    ) -> (String, CreditInstrument) {
        let db = engine.db().clone();
        let sku = format!("ITEM-{}", Uuid::new_v4().simple());
        let p = seed_simple_product(&db, tenant, &sku, price).await;
        receive_stock(engine, tenant, &p, dec!(5), price / dec!(2)).await;

        let sale = engine
            .checkout(
                tenant,
                CheckoutRequest {
                    lines: vec![CheckoutLine {
                        product_id: p.id.clone(),
                        quantity: dec!(1),
                    }],
                    payment_method: PaymentMethod::Credit,
                    customer_id: Some("cust-1".into()),
                    credit_terms: Some(CreditTerms {
                        interest_rate: rate,
                        due_date: None,
                    }),
                    notes: None,
                },
            )
            .await
            .unwrap();
        let instrument = db.credit().get_by_sale(&sale.id).await.unwrap().remove(0);
        (sale.id, instrument)
    }

    #[tokio::test]
    async fn partial_then_settling_payment() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let (sale_id, instrument) = credit_sale(&engine, "t1", dec!(100), dec!(0.001)).await;

        let outcome = engine
            .pay_credit("t1", &instrument.id, dec!(40), PaymentMethod::Cash)
            .await
            .unwrap();
        assert!(!outcome.settled);
        assert_eq!(outcome.instrument.current_balance, dec!(60));
        assert_eq!(outcome.instrument.status, CreditStatus::Active);

        let outcome = engine
            .pay_credit("t1", &instrument.id, dec!(60), PaymentMethod::Cash)
            .await
            .unwrap();
        assert!(outcome.settled);
        assert_eq!(outcome.instrument.current_balance, Decimal::ZERO);
        assert_eq!(outcome.instrument.status, CreditStatus::Paid);
        assert!(outcome.instrument.paid_at.is_some());

        // Both immutable payment rows persisted, and the originating sale
        // carries the running total.
        let payments = db.credit().list_payments(&instrument.id).await.unwrap();
        assert_eq!(payments.len(), 2);
        let sale = db.sales().get_by_id("t1", &sale_id).await.unwrap().unwrap();
        assert_eq!(sale.paid_amount, dec!(100));
        assert_eq!(sale.status, SaleStatus::Completed);
    }

    #[tokio::test]
    async fn overpayment_rolls_everything_back() {
        let engine = test_engine().await;
        let db = engine.db().clone();
        let (_, instrument) = credit_sale(&engine, "t1", dec!(50), dec!(0.001)).await;

        let err = engine
            .pay_credit("t1", &instrument.id, dec!(50.01), PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Overpayment { .. })));

        // No payment row, balance untouched.
        assert!(db.credit().list_payments(&instrument.id).await.unwrap().is_empty());
        let reloaded = db.credit().get_by_id(&instrument.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_balance, dec!(50));
    }

    #[tokio::test]
    async fn interest_accrues_per_day_and_is_idempotent() {
        let engine = test_engine().await;
        let (_, instrument) = credit_sale(&engine, "t1", dec!(100), dec!(0.001)).await;

        let later = instrument.last_interest_calculation_date + Duration::days(10);
        let accrued = engine
            .accrue_credit_to("t1", &instrument.id, later)
            .await
            .unwrap();
        // 100 × 0.001 × 10 days.
        assert_eq!(accrued.current_balance, dec!(101.000));
        assert_eq!(accrued.interest_amount, dec!(1.000));
        assert_eq!(accrued.last_interest_calculation_date, later);

        // A second read on the same day adds nothing.
        let again = engine
            .accrue_credit_to("t1", &instrument.id, later)
            .await
            .unwrap();
        assert_eq!(again.current_balance, dec!(101.000));
    }

    #[tokio::test]
    async fn payments_on_closed_instruments_are_rejected() {
        let engine = test_engine().await;
        let (_, instrument) = credit_sale(&engine, "t1", dec!(30), dec!(0)).await;

        engine
            .pay_credit("t1", &instrument.id, dec!(30), PaymentMethod::Cash)
            .await
            .unwrap();

        let err = engine
            .pay_credit("t1", &instrument.id, dec!(1), PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::CreditNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn tenant_scoping_and_validation() {
        let engine = test_engine().await;
        let (_, instrument) = credit_sale(&engine, "t1", dec!(20), dec!(0.001)).await;

        // Another tenant can neither see nor pay the instrument.
        let err = engine
            .pay_credit("t2", &instrument.id, dec!(5), PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::CreditNotFound(_))));

        let err = engine
            .pay_credit("t1", &instrument.id, dec!(0), PaymentMethod::Cash)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(
                ValidationError::NonPositiveQuantity { .. }
            ))
        ));
    }
}
