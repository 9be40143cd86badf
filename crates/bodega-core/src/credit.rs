//! # Credit Accrual Math
//!
//! Pure interest accrual and payment application for credit instruments.
//!
//! ## Lazy, Pull-Based Accrual
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  No scheduler. No background job.                                       │
//! │                                                                         │
//! │  Every read and write entry point calls accrue(instrument, today)      │
//! │  first. Idempotent per day: accruing twice on the same date is a       │
//! │  no-op the second time. An instrument untouched for a month accrues    │
//! │  the full month the next time it is touched.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Interest is simple: `delta = current_balance × daily_rate × days`, with
//! `days` truncated to whole days since the last calculation date.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{CoreError, CoreResult};
use crate::types::{CreditInstrument, CreditStatus};

/// Residual balance at or below this snaps to zero and the instrument
/// transitions to Paid. Absorbs rounding of fractional-day-rate products.
pub const SETTLEMENT_EPSILON: Decimal = dec!(0.01);

/// Outcome of an accrual pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// Interest added by this pass (zero for the same-day no-op).
    pub interest_delta: Decimal,
    /// Whole days the pass covered.
    pub days: i64,
}

/// Accrues interest on `instrument` up to `as_of`, mutating balance,
/// accumulated interest, and the last-calculation date.
///
/// No-op (and `days == 0`) when `as_of` is not strictly after the last
/// calculation date, which is what makes repeated calls safe. Paid and
/// cancelled instruments never accrue.
pub fn accrue(instrument: &mut CreditInstrument, as_of: NaiveDate) -> Accrual {
    if instrument.status != CreditStatus::Active {
        return Accrual {
            interest_delta: Decimal::ZERO,
            days: 0,
        };
    }

    let days = (as_of - instrument.last_interest_calculation_date).num_days();
    if days <= 0 {
        return Accrual {
            interest_delta: Decimal::ZERO,
            days: 0,
        };
    }

    let delta = instrument.current_balance * instrument.interest_rate * Decimal::from(days);
    instrument.interest_amount += delta;
    instrument.current_balance += delta;
    instrument.last_interest_calculation_date = as_of;

    Accrual {
        interest_delta: delta,
        days,
    }
}

/// Applies `amount` against the (already accrued) balance.
///
/// Overpayment is rejected outright — the engine never clamps or
/// partially applies. A residual within [`SETTLEMENT_EPSILON`] snaps to
/// zero and the instrument transitions to Paid; the caller stamps
/// `paid_at` and persists.
///
/// Returns `true` when the payment settled the instrument.
pub fn apply_payment(instrument: &mut CreditInstrument, amount: Decimal) -> CoreResult<bool> {
    if instrument.status != CreditStatus::Active {
        return Err(CoreError::CreditNotActive {
            instrument_id: instrument.id.clone(),
            status: instrument.status.as_str().to_string(),
        });
    }
    if amount > instrument.current_balance {
        return Err(CoreError::Overpayment {
            requested: amount,
            balance: instrument.current_balance,
        });
    }

    instrument.current_balance -= amount;

    if instrument.current_balance <= SETTLEMENT_EPSILON {
        instrument.current_balance = Decimal::ZERO;
        instrument.status = CreditStatus::Paid;
        return Ok(true);
    }
    Ok(false)
}

// =============================================================================
// Unit Tests
// =============================================================================
