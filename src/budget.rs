use axum::{
    Json,
    extract::{Path, Query, State},
};
use libsql::Connection;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::constants::*;
use crate::database::Db;
use crate::error::ApiError;
use crate::models::{
    ApiResponse, Budget, BudgetOverview, BudgetQuery, CategoryAllocation, CategorySpending,
    HistoryQuery, UpsertBudgetPayload,
};
use crate::reconcile;
use crate::state::AppState;
use crate::users::get_user_by_id;
use crate::utils::{validate_id, validate_limit};

pub fn extract_budget_from_row(row: libsql::Row) -> Result<Budget, ApiError> {
    let month: i64 = row
        .get(2)
        .map_err(ApiError::db("failed to get budget month"))?;
    let year: i64 = row
        .get(3)
        .map_err(ApiError::db("failed to get budget year"))?;
    let categories_json: String = row
        .get(7)
        .map_err(ApiError::db("failed to get budget categories"))?;
    let categories: Vec<CategoryAllocation> = serde_json::from_str(&categories_json)
        .map_err(|e| ApiError::Database(format!("invalid stored categories: {e}")))?;

    Ok(Budget {
        id: row.get(0).map_err(ApiError::db("failed to get budget id"))?,
        user_id: row
            .get(1)
            .map_err(ApiError::db("failed to get budget user id"))?,
        month: month as u8,
        year: year as i32,
        total_budget: row
            .get(4)
            .map_err(ApiError::db("failed to get total budget"))?,
        spent_amount: row
            .get(5)
            .map_err(ApiError::db("failed to get spent amount"))?,
        remaining_budget: row
            .get(6)
            .map_err(ApiError::db("failed to get remaining budget"))?,
        categories,
    })
}

const SELECT_BUDGET: &str = "SELECT id, user_id, month, year, total_budget, spent_amount, \
                             remaining_budget, categories FROM budgets";

async fn get_budget_row(
    conn: &Connection,
    user_id: &str,
    month: u8,
    year: i32,
) -> Result<Option<Budget>, ApiError> {
    let mut rows = conn
        .query(
            &format!("{SELECT_BUDGET} WHERE user_id = ? AND month = ? AND year = ?"),
            (user_id, month as i64, year as i64),
        )
        .await
        .map_err(ApiError::db("failed to query budget"))?;

    match rows
        .next()
        .await
        .map_err(ApiError::db("failed to read budget row"))?
    {
        Some(row) => Ok(Some(extract_budget_from_row(row)?)),
        None => Ok(None),
    }
}

fn current_period() -> (u8, i32) {
    let now = OffsetDateTime::now_utc();
    (u8::from(now.month()), now.year())
}

fn validate_categories(categories: &[CategoryAllocation]) -> Result<(), ApiError> {
    for allocation in categories {
        if !EXPENSE_CATEGORIES.contains(&allocation.name.as_str()) {
            return Err(ApiError::InvalidInput(format!(
                "Budget category must be one of: {}",
                EXPENSE_CATEGORIES.join(", ")
            )));
        }
        if !allocation.budget_amount.is_finite() || allocation.budget_amount < 0.0 {
            return Err(ApiError::InvalidInput(
                "Category budget amount must be a valid positive number".to_string(),
            ));
        }
    }
    Ok(())
}

/// Get-or-create-if-current-period.
///
/// Reading the current month's budget creates a persisted zero-valued record
/// when none exists; reading any other month synthesizes a zero-valued view
/// without persisting it. Existing records get their spent/remaining fields
/// recomputed from the ledger before being returned.
pub async fn fetch_or_create_budget(
    db: &Db,
    user_id: &str,
    query: BudgetQuery,
) -> Result<Budget, ApiError> {
    let (current_month, current_year) = current_period();
    let month = query.month.unwrap_or(current_month);
    let year = query.year.unwrap_or(current_year);
    let (start, end) = reconcile::month_bounds(year, month)?;

    let conn = db.write().await;
    let existing = get_budget_row(&conn, user_id, month, year).await?;

    let budget = match existing {
        Some(budget) => budget,
        None => {
            let is_current = month == current_month && year == current_year;
            if !is_current {
                // Synthesized view only, nothing persisted.
                return Ok(Budget {
                    id: String::new(),
                    user_id: user_id.to_string(),
                    month,
                    year,
                    total_budget: 0.0,
                    spent_amount: 0.0,
                    remaining_budget: 0.0,
                    categories: Vec::new(),
                });
            }
            let budget = Budget {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                month,
                year,
                total_budget: 0.0,
                spent_amount: 0.0,
                remaining_budget: 0.0,
                categories: Vec::new(),
            };
            conn.execute(
                "INSERT INTO budgets (id, user_id, month, year, total_budget, spent_amount, \
                 remaining_budget, categories) VALUES (?, ?, ?, ?, 0, 0, 0, '[]') \
                 ON CONFLICT (user_id, month, year) DO NOTHING",
                (
                    budget.id.as_str(),
                    user_id,
                    month as i64,
                    year as i64,
                ),
            )
            .await
            .map_err(ApiError::db("failed to create budget"))?;
            budget
        }
    };

    let spent = reconcile::sum_expenses(&conn, user_id, start, end)
        .await
        .map_err(|e| ApiError::Database(format!("failed to sum expenses: {e}")))?;
    let remaining = budget.total_budget - spent;
    conn.execute(
        "UPDATE budgets SET spent_amount = ?, remaining_budget = ? WHERE id = ?",
        (spent, remaining, budget.id.as_str()),
    )
    .await
    .map_err(ApiError::db("failed to reconcile budget"))?;

    Ok(Budget {
        spent_amount: spent,
        remaining_budget: remaining,
        ..budget
    })
}

/// Atomic create-or-update keyed by (user, month, year). The stored
/// spent/remaining fields are recomputed from the ledger as part of the
/// upsert.
pub async fn upsert_budget(
    db: &Db,
    user_id: &str,
    payload: UpsertBudgetPayload,
) -> Result<Budget, ApiError> {
    validate_id(user_id, "user ID format")?;
    if !payload.total_budget.is_finite() || payload.total_budget < 0.0 {
        return Err(ApiError::InvalidInput(
            "Total budget must be a valid positive number".to_string(),
        ));
    }
    let categories = payload.categories.unwrap_or_default();
    validate_categories(&categories)?;
    let categories_json = serde_json::to_string(&categories)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to serialize categories: {e}")))?;

    let (current_month, current_year) = current_period();
    let month = payload.month.unwrap_or(current_month);
    let year = payload.year.unwrap_or(current_year);
    let (start, end) = reconcile::month_bounds(year, month)?;

    let conn = db.write().await;
    if get_user_by_id(&conn, user_id).await?.is_none() {
        return Err(ApiError::NotFound(ERR_USER_NOT_FOUND.into()));
    }

    let spent = reconcile::sum_expenses(&conn, user_id, start, end)
        .await
        .map_err(|e| ApiError::Database(format!("failed to sum expenses: {e}")))?;
    let remaining = payload.total_budget - spent;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO budgets (id, user_id, month, year, total_budget, spent_amount, \
         remaining_budget, categories) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, month, year) DO UPDATE SET \
         total_budget = excluded.total_budget, spent_amount = excluded.spent_amount, \
         remaining_budget = excluded.remaining_budget, categories = excluded.categories",
        (
            id.as_str(),
            user_id,
            month as i64,
            year as i64,
            payload.total_budget,
            spent,
            remaining,
            categories_json.as_str(),
        ),
    )
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::Conflict("Budget for this month already exists".to_string())
        } else {
            ApiError::Database(format!("failed to upsert budget: {e}"))
        }
    })?;

    // Read back so the caller sees the canonical row (the original id when
    // the upsert hit an existing record).
    get_budget_row(&conn, user_id, month, year)
        .await?
        .ok_or_else(|| ApiError::Database("budget missing after upsert".to_string()))
}

/// Current-month overview with a per-category expense breakdown.
pub async fn fetch_budget_overview(db: &Db, user_id: &str) -> Result<BudgetOverview, ApiError> {
    let (month, year) = current_period();
    let (start, end) = reconcile::month_bounds(year, month)?;

    let conn = db.read().await;
    let budget = get_budget_row(&conn, user_id, month, year)
        .await?
        .ok_or_else(|| ApiError::NotFound("No budget found for current month".to_string()))?;

    let mut rows = conn
        .query(
            "SELECT category, COALESCE(SUM(amount), 0.0), COUNT(*) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date BETWEEN ? AND ? \
             GROUP BY category",
            (user_id, start, end),
        )
        .await
        .map_err(ApiError::db("failed to aggregate category spending"))?;

    let mut category_breakdown = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(ApiError::db("failed to read breakdown row"))?
    {
        category_breakdown.push(CategorySpending {
            category: row
                .get(0)
                .map_err(ApiError::db("failed to get category"))?,
            total_spent: row
                .get(1)
                .map_err(ApiError::db("failed to get category total"))?,
            transaction_count: row
                .get(2)
                .map_err(ApiError::db("failed to get category count"))?,
        });
    }

    let percentage_used = if budget.total_budget > 0.0 {
        budget.spent_amount / budget.total_budget * 100.0
    } else {
        0.0
    };

    Ok(BudgetOverview {
        total_budget: budget.total_budget,
        spent_amount: budget.spent_amount,
        remaining_budget: budget.remaining_budget,
        percentage_used,
        category_breakdown,
        month,
        year,
    })
}

/// Budgets sorted year then month descending, newest first.
pub async fn fetch_budget_history(
    db: &Db,
    user_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Budget>, ApiError> {
    let limit = validate_limit(limit, DEFAULT_HISTORY_LIMIT)?;

    let conn = db.read().await;
    let mut rows = conn
        .query(
            &format!(
                "{SELECT_BUDGET} WHERE user_id = ? ORDER BY year DESC, month DESC LIMIT ?"
            ),
            (user_id, limit as i64),
        )
        .await
        .map_err(ApiError::db("failed to query budget history"))?;

    let mut budgets = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(ApiError::db("failed to read budget row"))?
    {
        budgets.push(extract_budget_from_row(row)?);
    }
    Ok(budgets)
}

pub async fn remove_budget(
    db: &Db,
    user_id: &str,
    month: u8,
    year: i32,
) -> Result<Budget, ApiError> {
    // Rejects out-of-range months before touching the store.
    reconcile::month_bounds(year, month)?;

    let conn = db.write().await;
    let budget = get_budget_row(&conn, user_id, month, year)
        .await?
        .ok_or_else(|| ApiError::NotFound(ERR_BUDGET_NOT_FOUND.into()))?;

    conn.execute(
        "DELETE FROM budgets WHERE id = ?",
        [budget.id.as_str()],
    )
    .await
    .map_err(ApiError::db("failed to delete budget"))?;

    Ok(budget)
}

// --- Handlers ---

pub async fn get_budget(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<BudgetQuery>,
) -> Result<Json<ApiResponse<Budget>>, ApiError> {
    let budget = fetch_or_create_budget(&state.db, &user_id, query).await?;
    Ok(Json(ApiResponse::data(budget)))
}

pub async fn get_budget_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<BudgetOverview>>, ApiError> {
    let overview = fetch_budget_overview(&state.db, &user_id).await?;
    Ok(Json(ApiResponse::data(overview)))
}

pub async fn get_budget_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<Budget>>>, ApiError> {
    let budgets = fetch_budget_history(&state.db, &user_id, query.limit).await?;
    Ok(Json(ApiResponse::data(budgets)))
}

pub async fn create_or_update_budget(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpsertBudgetPayload>,
) -> Result<Json<ApiResponse<Budget>>, ApiError> {
    let budget = upsert_budget(&state.db, &user_id, payload).await?;
    Ok(Json(ApiResponse::with_message(
        "Budget updated successfully",
        budget,
    )))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    Path((user_id, month, year)): Path<(String, u8, i32)>,
) -> Result<Json<ApiResponse<Budget>>, ApiError> {
    let budget = remove_budget(&state.db, &user_id, month, year).await?;
    Ok(Json(ApiResponse::with_message(
        "Budget deleted successfully",
        budget,
    )))
}
