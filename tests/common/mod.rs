use fintrack_server::database::{Db, init_db};
use tempfile::tempdir;
use time::{Date, Month, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Opens a fresh database in a temp directory. The directory is leaked so it
/// outlives the test.
pub async fn setup_test_db() -> Db {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir
        .path()
        .to_str()
        .expect("Failed to convert path to string")
        .to_string();

    let db = init_db(&data_path)
        .await
        .unwrap_or_else(|e| panic!("Failed to initialize database at {}: {}", data_path, e));

    std::mem::forget(temp_dir);
    db
}

pub async fn create_test_user(db: &Db, name: &str, email: &str, balance: f64) -> String {
    let user_id = Uuid::new_v4().to_string();
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, balance) VALUES (?, ?, ?, ?, ?)",
        (user_id.as_str(), name, email, "test-hash", balance),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test user '{}': {}", name, e));
    user_id
}

pub async fn create_test_transaction(
    db: &Db,
    user_id: &str,
    amount: f64,
    kind: &str,
    category: &str,
    timestamp: i64,
) -> String {
    let transaction_id = Uuid::new_v4().to_string();
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO transactions (id, user_id, amount, kind, category, description, date) \
         VALUES (?, ?, ?, ?, ?, '', ?)",
        (
            transaction_id.as_str(),
            user_id,
            amount,
            kind,
            category,
            timestamp,
        ),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test transaction for {}: {}", user_id, e));
    transaction_id
}

pub async fn create_test_budget(
    db: &Db,
    user_id: &str,
    month: u8,
    year: i32,
    total_budget: f64,
) -> String {
    let budget_id = Uuid::new_v4().to_string();
    let conn = db.write().await;
    conn.execute(
        "INSERT INTO budgets (id, user_id, month, year, total_budget, spent_amount, \
         remaining_budget, categories) VALUES (?, ?, ?, ?, ?, 0, ?, '[]')",
        (
            budget_id.as_str(),
            user_id,
            month as i64,
            year as i64,
            total_budget,
            total_budget,
        ),
    )
    .await
    .unwrap_or_else(|e| panic!("Failed to insert test budget for {}: {}", user_id, e));
    budget_id
}

pub async fn get_balance(db: &Db, user_id: &str) -> f64 {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT balance FROM users WHERE id = ?", [user_id])
        .await
        .expect("Failed to query balance");
    let row = rows
        .next()
        .await
        .expect("Failed to read balance row")
        .expect("User not found");
    row.get(0).expect("Failed to get balance value")
}

/// (total_budget, spent_amount, remaining_budget) for one budget record.
pub async fn get_budget_fields(
    db: &Db,
    user_id: &str,
    month: u8,
    year: i32,
) -> Option<(f64, f64, f64)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT total_budget, spent_amount, remaining_budget FROM budgets \
             WHERE user_id = ? AND month = ? AND year = ?",
            (user_id, month as i64, year as i64),
        )
        .await
        .expect("Failed to query budget");
    let row = rows.next().await.expect("Failed to read budget row")?;
    Some((
        row.get(0).expect("Failed to get total_budget"),
        row.get(1).expect("Failed to get spent_amount"),
        row.get(2).expect("Failed to get remaining_budget"),
    ))
}

pub async fn count_transactions(db: &Db, user_id: &str) -> u32 {
    count_rows(db, "SELECT COUNT(*) FROM transactions WHERE user_id = ?", user_id).await
}

pub async fn count_budgets(db: &Db, user_id: &str) -> u32 {
    count_rows(db, "SELECT COUNT(*) FROM budgets WHERE user_id = ?", user_id).await
}

async fn count_rows(db: &Db, sql: &str, user_id: &str) -> u32 {
    let conn = db.read().await;
    let mut rows = conn
        .query(sql, [user_id])
        .await
        .expect("Failed to execute count query");
    let row = rows
        .next()
        .await
        .expect("Failed to read count row")
        .expect("Count query returned no rows");
    row.get(0).expect("Failed to get count value")
}

/// Unix seconds for noon UTC on the given calendar day.
pub fn timestamp_for(year: i32, month: u8, day: u8) -> i64 {
    let month = Month::try_from(month).expect("Invalid test month");
    let date = Date::from_calendar_date(year, month, day).expect("Invalid test date");
    PrimitiveDateTime::new(date, Time::from_hms(12, 0, 0).unwrap())
        .assume_utc()
        .unix_timestamp()
}
