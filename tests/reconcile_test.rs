/*!
 * Reconciliation Unit Tests
 *
 * Tests for the balance arithmetic applied on every transaction mutation and
 * for the budget spent/remaining recomputation, including its idempotence
 * and its no-op behavior when no budget record exists.
 */

mod common;

use common::*;
use fintrack_server::error::ApiError;
use fintrack_server::models::TransactionKind;
use fintrack_server::reconcile::{
    balance_after_create, balance_after_delete, balance_after_update, month_bounds,
    reconcile_period,
};

#[test]
fn income_create_raises_balance() {
    let balance = balance_after_create(1000.0, TransactionKind::Income, 500.0).unwrap();
    assert_eq!(balance, 1500.0);
}

#[test]
fn expense_create_lowers_balance() {
    let balance = balance_after_create(1000.0, TransactionKind::Expense, 300.0).unwrap();
    assert_eq!(balance, 700.0);
}

#[test]
fn expense_create_rejects_negative_balance() {
    let result = balance_after_create(1000.0, TransactionKind::Expense, 1500.0);
    assert!(matches!(result, Err(ApiError::InsufficientBalance(_))));
}

#[test]
fn expense_create_allows_exact_zero_balance() {
    let balance = balance_after_create(1000.0, TransactionKind::Expense, 1000.0).unwrap();
    assert_eq!(balance, 0.0);
}

#[test]
fn update_reverses_old_effect_before_applying_new() {
    // 1000 with an existing expense of 200; raising it to 350.
    let balance = balance_after_update(
        1000.0,
        TransactionKind::Expense,
        200.0,
        TransactionKind::Expense,
        350.0,
    )
    .unwrap();
    assert_eq!(balance, 850.0);
}

#[test]
fn update_can_flip_kind() {
    // 1000 after an income of 300; editing it into an expense of 300.
    let balance = balance_after_update(
        1000.0,
        TransactionKind::Income,
        300.0,
        TransactionKind::Expense,
        300.0,
    )
    .unwrap();
    assert_eq!(balance, 400.0);
}

#[test]
fn update_rejects_negative_result() {
    let result = balance_after_update(
        100.0,
        TransactionKind::Expense,
        50.0,
        TransactionKind::Expense,
        500.0,
    );
    assert!(matches!(result, Err(ApiError::InsufficientBalance(_))));
}

#[test]
fn delete_reverses_expense() {
    assert_eq!(
        balance_after_delete(700.0, TransactionKind::Expense, 300.0),
        1000.0
    );
}

#[test]
fn delete_reverses_income_even_below_zero() {
    // No lower-bound check on delete.
    assert_eq!(
        balance_after_delete(100.0, TransactionKind::Income, 500.0),
        -400.0
    );
}

#[test]
fn month_bounds_cover_whole_month() {
    let (start, end) = month_bounds(2024, 3).unwrap();
    assert_eq!(start, timestamp_for(2024, 3, 1) - 12 * 3600);
    // Last instant is 23:59:59 on March 31.
    assert_eq!(end, timestamp_for(2024, 3, 31) + 11 * 3600 + 59 * 60 + 59);
}

#[test]
fn month_bounds_handle_leap_february() {
    let (start, end) = month_bounds(2024, 2).unwrap();
    assert!(start < timestamp_for(2024, 2, 29));
    assert!(end > timestamp_for(2024, 2, 29));
    let (_, end_2023) = month_bounds(2023, 2).unwrap();
    assert!(end_2023 < timestamp_for(2023, 3, 1));
}

#[test]
fn month_bounds_reject_out_of_range_month() {
    assert!(matches!(
        month_bounds(2024, 0),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        month_bounds(2024, 13),
        Err(ApiError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn reconcile_recomputes_spent_and_remaining() {
    let db = setup_test_db().await;
    let user_id = create_test_user(&db, "Ada", "ada@example.com", 5000.0).await;
    create_test_budget(&db, &user_id, 6, 2024, 2000.0).await;

    create_test_transaction(&db, &user_id, 300.0, "expense", "Food", timestamp_for(2024, 6, 5))
        .await;
    create_test_transaction(&db, &user_id, 450.0, "expense", "Rent", timestamp_for(2024, 6, 20))
        .await;
    // Income and out-of-month expenses must not count.
    create_test_transaction(&db, &user_id, 900.0, "income", "Salary", timestamp_for(2024, 6, 1))
        .await;
    create_test_transaction(&db, &user_id, 99.0, "expense", "Food", timestamp_for(2024, 7, 1))
        .await;

    reconcile_period(&db, &user_id, 6, 2024).await.unwrap();

    let (total, spent, remaining) = get_budget_fields(&db, &user_id, 6, 2024).await.unwrap();
    assert_eq!(total, 2000.0);
    assert_eq!(spent, 750.0);
    assert_eq!(remaining, 1250.0);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let db = setup_test_db().await;
    let user_id = create_test_user(&db, "Ada", "ada@example.com", 5000.0).await;
    create_test_budget(&db, &user_id, 6, 2024, 1000.0).await;
    create_test_transaction(&db, &user_id, 250.0, "expense", "Travel", timestamp_for(2024, 6, 10))
        .await;

    reconcile_period(&db, &user_id, 6, 2024).await.unwrap();
    let first = get_budget_fields(&db, &user_id, 6, 2024).await.unwrap();
    reconcile_period(&db, &user_id, 6, 2024).await.unwrap();
    let second = get_budget_fields(&db, &user_id, 6, 2024).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.1, 250.0);
}

#[tokio::test]
async fn reconcile_without_budget_record_is_noop() {
    let db = setup_test_db().await;
    let user_id = create_test_user(&db, "Ada", "ada@example.com", 5000.0).await;
    create_test_transaction(&db, &user_id, 250.0, "expense", "Food", timestamp_for(2024, 6, 10))
        .await;

    reconcile_period(&db, &user_id, 6, 2024).await.unwrap();

    assert_eq!(count_budgets(&db, &user_id).await, 0);
}

#[tokio::test]
async fn reconcile_remaining_can_go_negative() {
    let db = setup_test_db().await;
    let user_id = create_test_user(&db, "Ada", "ada@example.com", 5000.0).await;
    create_test_budget(&db, &user_id, 6, 2024, 100.0).await;
    create_test_transaction(&db, &user_id, 400.0, "expense", "Shopping", timestamp_for(2024, 6, 3))
        .await;

    reconcile_period(&db, &user_id, 6, 2024).await.unwrap();

    let (_, spent, remaining) = get_budget_fields(&db, &user_id, 6, 2024).await.unwrap();
    assert_eq!(spent, 400.0);
    assert_eq!(remaining, -300.0);
}
