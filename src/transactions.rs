use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::Connection;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::constants::*;
use crate::database::Db;
use crate::error::ApiError;
use crate::models::{
    ApiResponse, CreateTransactionPayload, DeletedTransaction, StatsQuery, Transaction,
    TransactionKind, TransactionPage, TransactionQuery, TransactionStats, TransactionWithBalance,
    UpdateTransactionPayload,
};
use crate::reconcile;
use crate::state::AppState;
use crate::users::get_user_by_id;
use crate::utils::{parse_rfc3339, validate_amount, validate_category, validate_id, validate_limit, validate_page};

pub fn extract_transaction_from_row(row: libsql::Row) -> Result<Transaction, ApiError> {
    let kind: String = row
        .get(3)
        .map_err(ApiError::db("failed to get transaction kind"))?;
    let kind = TransactionKind::parse(&kind)
        .map_err(|_| ApiError::Database(format!("unexpected transaction kind in store: {kind}")))?;
    let timestamp: i64 = row
        .get(6)
        .map_err(ApiError::db("failed to get transaction date"))?;
    let date = OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| ApiError::Database(format!("invalid stored timestamp {timestamp}: {e}")))?;

    Ok(Transaction {
        id: row
            .get(0)
            .map_err(ApiError::db("failed to get transaction id"))?,
        user_id: row
            .get(1)
            .map_err(ApiError::db("failed to get transaction user id"))?,
        amount: row
            .get(2)
            .map_err(ApiError::db("failed to get transaction amount"))?,
        kind,
        category: row
            .get(4)
            .map_err(ApiError::db("failed to get transaction category"))?,
        description: row
            .get(5)
            .map_err(ApiError::db("failed to get transaction description"))?,
        date,
    })
}

const SELECT_TRANSACTION: &str =
    "SELECT id, user_id, amount, kind, category, description, date FROM transactions";

async fn get_transaction_by_id(
    conn: &Connection,
    user_id: &str,
    id: &str,
) -> Result<Option<Transaction>, ApiError> {
    let mut rows = conn
        .query(
            &format!("{SELECT_TRANSACTION} WHERE id = ? AND user_id = ?"),
            (id, user_id),
        )
        .await
        .map_err(ApiError::db("failed to query transaction"))?;

    match rows
        .next()
        .await
        .map_err(ApiError::db("failed to read transaction row"))?
    {
        Some(row) => Ok(Some(extract_transaction_from_row(row)?)),
        None => Ok(None),
    }
}

/// Resolves list filters to an inclusive `[start, end]` range of Unix
/// seconds. A (month, year) filter takes precedence over an explicit range.
fn resolve_date_range(
    month: Option<u8>,
    year: Option<i32>,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<(i64, i64), ApiError> {
    if let (Some(month), Some(year)) = (month, year) {
        return reconcile::month_bounds(year, month);
    }
    let start = match start_date {
        Some(value) => parse_rfc3339(value, "startDate")?.unix_timestamp(),
        None => i64::MIN,
    };
    let end = match end_date {
        Some(value) => parse_rfc3339(value, "endDate")?.unix_timestamp(),
        None => i64::MAX,
    };
    Ok((start, end))
}

/// Filtered, paginated ledger listing, newest first.
pub async fn fetch_transactions(
    db: &Db,
    user_id: &str,
    query: TransactionQuery,
) -> Result<TransactionPage, ApiError> {
    let page = validate_page(query.page)?;
    let limit = validate_limit(query.limit, DEFAULT_PAGE_LIMIT)?;
    let kind = match query.kind.as_deref() {
        Some(value) => Some(TransactionKind::parse(value)?),
        None => None,
    };
    let (start, end) = resolve_date_range(
        query.month,
        query.year,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )?;
    let offset = (page - 1) * limit;

    let conn = db.read().await;

    let total: u32 = {
        let mut rows = match kind {
            Some(kind) => conn
                .query(
                    "SELECT COUNT(*) FROM transactions \
                     WHERE user_id = ? AND kind = ? AND date BETWEEN ? AND ?",
                    (user_id, kind.as_str(), start, end),
                )
                .await
                .map_err(ApiError::db("failed to count transactions"))?,
            None => conn
                .query(
                    "SELECT COUNT(*) FROM transactions \
                     WHERE user_id = ? AND date BETWEEN ? AND ?",
                    (user_id, start, end),
                )
                .await
                .map_err(ApiError::db("failed to count transactions"))?,
        };
        match rows
            .next()
            .await
            .map_err(ApiError::db("failed to read count row"))?
        {
            Some(row) => row.get(0).map_err(ApiError::db("failed to get count"))?,
            None => 0,
        }
    };

    let mut rows = match kind {
        Some(kind) => conn
            .query(
                &format!(
                    "{SELECT_TRANSACTION} WHERE user_id = ? AND kind = ? AND date BETWEEN ? AND ? \
                     ORDER BY date DESC LIMIT ? OFFSET ?"
                ),
                (user_id, kind.as_str(), start, end, limit as i64, offset as i64),
            )
            .await
            .map_err(ApiError::db("failed to query transactions"))?,
        None => conn
            .query(
                &format!(
                    "{SELECT_TRANSACTION} WHERE user_id = ? AND date BETWEEN ? AND ? \
                     ORDER BY date DESC LIMIT ? OFFSET ?"
                ),
                (user_id, start, end, limit as i64, offset as i64),
            )
            .await
            .map_err(ApiError::db("failed to query transactions"))?,
    };

    let mut transactions = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(ApiError::db("failed to read transaction row"))?
    {
        transactions.push(extract_transaction_from_row(row)?);
    }

    Ok(TransactionPage {
        transactions,
        total_pages: total.div_ceil(limit),
        current_page: page,
        total,
    })
}

/// Income/expense sums and counts over an optional date range, combined with
/// the user's current balance.
pub async fn compute_stats(
    db: &Db,
    user_id: &str,
    query: StatsQuery,
) -> Result<TransactionStats, ApiError> {
    let (start, end) = resolve_date_range(
        None,
        None,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    )?;

    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT kind, COALESCE(SUM(amount), 0.0), COUNT(*) FROM transactions \
             WHERE user_id = ? AND date BETWEEN ? AND ? GROUP BY kind",
            (user_id, start, end),
        )
        .await
        .map_err(ApiError::db("failed to aggregate transactions"))?;

    let mut stats = TransactionStats {
        income: 0.0,
        expenses: 0.0,
        balance: 0.0,
        total_transactions: 0,
        income_transactions: 0,
        expense_transactions: 0,
    };
    while let Some(row) = rows
        .next()
        .await
        .map_err(ApiError::db("failed to read stats row"))?
    {
        let kind: String = row.get(0).map_err(ApiError::db("failed to get kind"))?;
        let total: f64 = row.get(1).map_err(ApiError::db("failed to get sum"))?;
        let count: u32 = row.get(2).map_err(ApiError::db("failed to get count"))?;
        match kind.as_str() {
            "income" => {
                stats.income = total;
                stats.income_transactions = count;
            }
            "expense" => {
                stats.expenses = total;
                stats.expense_transactions = count;
            }
            _ => {}
        }
    }
    stats.total_transactions = stats.income_transactions + stats.expense_transactions;
    stats.balance = match get_user_by_id(&conn, user_id).await? {
        Some(user) => user.balance,
        None => 0.0,
    };

    Ok(stats)
}

pub async fn fetch_transaction(db: &Db, user_id: &str, id: &str) -> Result<Transaction, ApiError> {
    validate_id(id, "transaction ID")?;
    let conn = db.read().await;
    get_transaction_by_id(&conn, user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(ERR_TRANSACTION_NOT_FOUND.into()))
}

fn validate_description(description: &str) -> Result<(), ApiError> {
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Description must be less than {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Creates a transaction and applies its effect to the user's balance, both
/// in one storage transaction. Validation, including the insufficient-balance
/// check, happens before anything is written.
pub async fn add_transaction(
    db: &Db,
    user_id: &str,
    payload: CreateTransactionPayload,
) -> Result<TransactionWithBalance, ApiError> {
    let kind = TransactionKind::parse(&payload.kind)?;
    validate_amount(payload.amount)?;
    validate_category(&payload.category, kind == TransactionKind::Expense)?;
    let description = payload.description.unwrap_or_default();
    validate_description(&description)?;
    let date = match payload.date.as_deref() {
        Some(value) => parse_rfc3339(value, "date")?,
        None => OffsetDateTime::now_utc(),
    };

    let transaction = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        amount: payload.amount,
        kind,
        category: payload.category.trim().to_string(),
        description,
        date,
    };

    let new_balance = {
        let conn = db.write().await;
        let user = get_user_by_id(&conn, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;

        let new_balance = reconcile::balance_after_create(user.balance, kind, payload.amount)?;

        let tx = conn
            .transaction()
            .await
            .map_err(ApiError::db("failed to begin transaction"))?;
        tx.execute(
            "INSERT INTO transactions (id, user_id, amount, kind, category, description, date) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                transaction.id.as_str(),
                user_id,
                transaction.amount,
                kind.as_str(),
                transaction.category.as_str(),
                transaction.description.as_str(),
                transaction.date.unix_timestamp(),
            ),
        )
        .await
        .map_err(ApiError::db("failed to insert transaction"))?;
        tx.execute(
            "UPDATE users SET balance = ? WHERE id = ?",
            (new_balance, user_id),
        )
        .await
        .map_err(ApiError::db("failed to update balance"))?;
        tx.commit()
            .await
            .map_err(ApiError::db("failed to commit transaction"))?;

        new_balance
    };

    // Side effect after the commit: failure leaves the committed write in
    // place and is only logged.
    if kind == TransactionKind::Expense {
        if let Err(e) = reconcile::reconcile_budget(db, user_id, transaction.date).await {
            tracing::warn!("budget reconciliation failed after transaction create: {e:#}");
        }
    }

    Ok(TransactionWithBalance {
        transaction,
        new_balance,
    })
}

/// Overwrites a transaction's fields, reversing its old balance effect and
/// applying the new one. Rejects the whole edit if the result would be a
/// negative balance.
pub async fn edit_transaction(
    db: &Db,
    user_id: &str,
    id: &str,
    payload: UpdateTransactionPayload,
) -> Result<TransactionWithBalance, ApiError> {
    validate_id(id, "transaction ID")?;

    let new_kind = match payload.kind.as_deref() {
        Some(value) => Some(TransactionKind::parse(value)?),
        None => None,
    };
    if let Some(amount) = payload.amount {
        validate_amount(amount)?;
    }
    if let Some(description) = payload.description.as_deref() {
        validate_description(description)?;
    }
    let new_date = match payload.date.as_deref() {
        Some(value) => Some(parse_rfc3339(value, "date")?),
        None => None,
    };

    let (old, updated, new_balance) = {
        let conn = db.write().await;
        let old = get_transaction_by_id(&conn, user_id, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(ERR_TRANSACTION_NOT_FOUND.into()))?;
        let user = get_user_by_id(&conn, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;

        let kind = new_kind.unwrap_or(old.kind);
        let amount = payload.amount.unwrap_or(old.amount);
        let category = match payload.category {
            Some(ref category) => category.trim().to_string(),
            None => old.category.clone(),
        };
        // The final kind/category pair must be valid even when only one of
        // the two was edited.
        validate_category(&category, kind == TransactionKind::Expense)?;

        let updated = Transaction {
            id: old.id.clone(),
            user_id: old.user_id.clone(),
            amount,
            kind,
            category,
            description: payload
                .description
                .clone()
                .unwrap_or_else(|| old.description.clone()),
            date: new_date.unwrap_or(old.date),
        };

        let new_balance =
            reconcile::balance_after_update(user.balance, old.kind, old.amount, kind, amount)?;

        let tx = conn
            .transaction()
            .await
            .map_err(ApiError::db("failed to begin transaction"))?;
        tx.execute(
            "UPDATE transactions SET amount = ?, kind = ?, category = ?, description = ?, date = ? \
             WHERE id = ? AND user_id = ?",
            (
                updated.amount,
                updated.kind.as_str(),
                updated.category.as_str(),
                updated.description.as_str(),
                updated.date.unix_timestamp(),
                id,
                user_id,
            ),
        )
        .await
        .map_err(ApiError::db("failed to update transaction"))?;
        tx.execute(
            "UPDATE users SET balance = ? WHERE id = ?",
            (new_balance, user_id),
        )
        .await
        .map_err(ApiError::db("failed to update balance"))?;
        tx.commit()
            .await
            .map_err(ApiError::db("failed to commit transaction"))?;

        (old, updated, new_balance)
    };

    // An edit can touch two budget periods: the one the expense left and the
    // one it joined.
    let mut periods: Vec<(u8, i32)> = Vec::new();
    if old.kind == TransactionKind::Expense {
        periods.push((u8::from(old.date.month()), old.date.year()));
    }
    if updated.kind == TransactionKind::Expense {
        let period = (u8::from(updated.date.month()), updated.date.year());
        if !periods.contains(&period) {
            periods.push(period);
        }
    }
    for (month, year) in periods {
        if let Err(e) = reconcile::reconcile_period(db, user_id, month, year).await {
            tracing::warn!("budget reconciliation failed after transaction update: {e:#}");
        }
    }

    Ok(TransactionWithBalance {
        transaction: updated,
        new_balance,
    })
}

/// Deletes a transaction and reverses its balance effect, unconditionally.
pub async fn remove_transaction(
    db: &Db,
    user_id: &str,
    id: &str,
) -> Result<DeletedTransaction, ApiError> {
    validate_id(id, "transaction ID")?;

    let (deleted, new_balance) = {
        let conn = db.write().await;
        let transaction = get_transaction_by_id(&conn, user_id, id)
            .await?
            .ok_or_else(|| ApiError::NotFound(ERR_TRANSACTION_NOT_FOUND.into()))?;
        let user = get_user_by_id(&conn, user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;

        let new_balance =
            reconcile::balance_after_delete(user.balance, transaction.kind, transaction.amount);

        let tx = conn
            .transaction()
            .await
            .map_err(ApiError::db("failed to begin transaction"))?;
        tx.execute(
            "DELETE FROM transactions WHERE id = ? AND user_id = ?",
            (id, user_id),
        )
        .await
        .map_err(ApiError::db("failed to delete transaction"))?;
        tx.execute(
            "UPDATE users SET balance = ? WHERE id = ?",
            (new_balance, user_id),
        )
        .await
        .map_err(ApiError::db("failed to update balance"))?;
        tx.commit()
            .await
            .map_err(ApiError::db("failed to commit transaction"))?;

        (transaction, new_balance)
    };

    if deleted.kind == TransactionKind::Expense {
        if let Err(e) = reconcile::reconcile_budget(db, user_id, deleted.date).await {
            tracing::warn!("budget reconciliation failed after transaction delete: {e:#}");
        }
    }

    Ok(DeletedTransaction {
        deleted_transaction: deleted,
        new_balance,
    })
}

// --- Handlers ---

pub async fn get_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ApiResponse<TransactionPage>>, ApiError> {
    let page = fetch_transactions(&state.db, &user_id, query).await?;
    Ok(Json(ApiResponse::data(page)))
}

pub async fn get_transaction_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<ApiResponse<TransactionStats>>, ApiError> {
    let stats = compute_stats(&state.db, &user_id, query).await?;
    Ok(Json(ApiResponse::data(stats)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Transaction>>, ApiError> {
    let transaction = fetch_transaction(&state.db, &user_id, &id).await?;
    Ok(Json(ApiResponse::data(transaction)))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<CreateTransactionPayload>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionWithBalance>>), ApiError> {
    let result = add_transaction(&state.db, &user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Transaction added successfully",
            result,
        )),
    ))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
    Json(payload): Json<UpdateTransactionPayload>,
) -> Result<Json<ApiResponse<TransactionWithBalance>>, ApiError> {
    let result = edit_transaction(&state.db, &user_id, &id, payload).await?;
    Ok(Json(ApiResponse::with_message(
        "Transaction updated successfully",
        result,
    )))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<DeletedTransaction>>, ApiError> {
    let result = remove_transaction(&state.db, &user_id, &id).await?;
    Ok(Json(ApiResponse::with_message(
        "Transaction deleted successfully",
        result,
    )))
}
