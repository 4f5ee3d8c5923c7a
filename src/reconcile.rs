//! Balance and budget reconciliation.
//!
//! The balance functions are the arithmetic every transaction mutation must
//! go through: create applies `sign * amount`, update reverses the old effect
//! before applying the new one, delete reverses unconditionally. An expense
//! is rejected before anything is written if it would drive the balance
//! negative.
//!
//! Budget reconciliation recomputes a budget's `spent_amount` and
//! `remaining_budget` from the expense transactions of its (month, year). It
//! is idempotent and a no-op when no budget record exists for the period.

use libsql::Connection;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::database::Db;
use crate::error::ApiError;
use crate::models::TransactionKind;

pub fn balance_after_create(
    balance: f64,
    kind: TransactionKind,
    amount: f64,
) -> Result<f64, ApiError> {
    let new_balance = balance + kind.sign() * amount;
    if kind == TransactionKind::Expense && new_balance < 0.0 {
        return Err(ApiError::InsufficientBalance(
            "Insufficient balance for this expense".to_string(),
        ));
    }
    Ok(new_balance)
}

pub fn balance_after_update(
    balance: f64,
    old_kind: TransactionKind,
    old_amount: f64,
    new_kind: TransactionKind,
    new_amount: f64,
) -> Result<f64, ApiError> {
    let reversed = balance - old_kind.sign() * old_amount;
    let new_balance = reversed + new_kind.sign() * new_amount;
    if new_balance < 0.0 {
        return Err(ApiError::InsufficientBalance(
            "Insufficient balance for this transaction".to_string(),
        ));
    }
    Ok(new_balance)
}

/// Deleting always reverses the transaction's effect; a balance going
/// negative from removing an income record is allowed.
pub fn balance_after_delete(balance: f64, kind: TransactionKind, amount: f64) -> f64 {
    balance - kind.sign() * amount
}

/// First and last instant (23:59:59) of a month, as Unix seconds.
pub fn month_bounds(year: i32, month: u8) -> Result<(i64, i64), ApiError> {
    let month = Month::try_from(month)
        .map_err(|_| ApiError::InvalidInput("Month must be between 1 and 12".to_string()))?;
    let first = Date::from_calendar_date(year, month, 1)
        .map_err(|_| ApiError::InvalidInput(format!("Invalid year: {year}")))?;
    let last_day = time::util::days_in_year_month(year, month);
    let last = Date::from_calendar_date(year, month, last_day)
        .map_err(|_| ApiError::InvalidInput(format!("Invalid year: {year}")))?;

    let start = PrimitiveDateTime::new(first, Time::MIDNIGHT)
        .assume_utc()
        .unix_timestamp();
    let end = PrimitiveDateTime::new(last, Time::from_hms(23, 59, 59).unwrap())
        .assume_utc()
        .unix_timestamp();
    Ok((start, end))
}

/// Sum of a user's expense transactions dated within `[start, end]`.
pub async fn sum_expenses(
    conn: &Connection,
    user_id: &str,
    start: i64,
    end: i64,
) -> anyhow::Result<f64> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(SUM(amount), 0.0) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date BETWEEN ? AND ?",
            (user_id, start, end),
        )
        .await?;

    let total = match rows.next().await? {
        Some(row) => row.get::<f64>(0)?,
        None => 0.0,
    };
    Ok(total)
}

/// Recomputes spent/remaining for the budget covering `date`'s month.
///
/// Callers must not hold the database lock when calling this.
pub async fn reconcile_budget(db: &Db, user_id: &str, date: OffsetDateTime) -> anyhow::Result<()> {
    reconcile_period(db, user_id, u8::from(date.month()), date.year()).await
}

/// Recomputes spent/remaining for one (user, month, year) budget record.
/// Does nothing when no record exists; budgets are never created by
/// transaction activity.
pub async fn reconcile_period(db: &Db, user_id: &str, month: u8, year: i32) -> anyhow::Result<()> {
    let (start, end) = month_bounds(year, month)
        .map_err(|e| anyhow::anyhow!("invalid budget period {month}/{year}: {e}"))?;

    let conn = db.write().await;
    let mut rows = conn
        .query(
            "SELECT id FROM budgets WHERE user_id = ? AND month = ? AND year = ?",
            (user_id, month as i64, year as i64),
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(());
    };
    let budget_id: String = row.get(0)?;

    let spent = sum_expenses(&conn, user_id, start, end).await?;

    // remaining_budget is always derived from total_budget at write time.
    conn.execute(
        "UPDATE budgets SET spent_amount = ?, remaining_budget = total_budget - ? WHERE id = ?",
        (spent, spent, budget_id.as_str()),
    )
    .await?;

    Ok(())
}
