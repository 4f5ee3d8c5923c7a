use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tempfile::tempdir;
use tokio::runtime::Runtime;
use uuid::Uuid;

use fintrack_server::database::{Db, init_db};
use fintrack_server::reconcile::sum_expenses;

// Benchmark constants
const BENCH_BASE_TIMESTAMP: i64 = 1700000000;
const BENCH_TRANSACTION_COUNT: usize = 1000;

const CATEGORIES: [&str; 6] = ["Rent", "Food", "Travel", "Groceries", "Shopping", "Others"];

async fn setup_benchmark_environment() -> (Db, String, tempfile::TempDir) {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let data_path = temp_dir.path().to_str().unwrap().to_string();
    let user_id = Uuid::new_v4().to_string();

    let db = init_db(&data_path).await.unwrap();
    {
        let conn = db.write().await;
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, balance) VALUES (?, ?, ?, ?, ?)",
            (user_id.as_str(), "Bench User", "bench@example.com", "hash", 1_000_000.0),
        )
        .await
        .unwrap();
    }

    (db, user_id, temp_dir)
}

async fn create_benchmark_transactions(db: &Db, user_id: &str, count: usize) {
    let conn = db.write().await;

    for i in 0..count {
        let transaction_id = Uuid::new_v4().to_string();
        let timestamp = BENCH_BASE_TIMESTAMP + i as i64;
        let amount = 10.0 + (i % 100) as f64;
        let kind = if i % 3 == 0 { "income" } else { "expense" };
        let category = CATEGORIES[i % CATEGORIES.len()];

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
        .unwrap();
    }
}

async fn benchmark_list_query(db: &Db, user_id: &str) {
    let conn = db.read().await;

    let mut rows = conn
        .query(
            "SELECT id, user_id, amount, kind, category, description, date FROM transactions \
             WHERE user_id = ? ORDER BY date DESC LIMIT 500",
            [user_id],
        )
        .await
        .unwrap();

    let mut count = 0;
    while let Some(_row) = rows.next().await.unwrap() {
        count += 1;
    }

    black_box(count);
}

async fn benchmark_expense_sum(db: &Db, user_id: &str) {
    let conn = db.read().await;

    let start = BENCH_BASE_TIMESTAMP + 100;
    let end = BENCH_BASE_TIMESTAMP + 500;
    let total = sum_expenses(&conn, user_id, start, end).await.unwrap();

    black_box(total);
}

async fn benchmark_category_breakdown(db: &Db, user_id: &str) {
    let conn = db.read().await;

    let mut rows = conn
        .query(
            "SELECT category, COALESCE(SUM(amount), 0), COUNT(*) FROM transactions \
             WHERE user_id = ? AND kind = 'expense' AND date BETWEEN ? AND ? \
             GROUP BY category",
            (user_id, BENCH_BASE_TIMESTAMP, BENCH_BASE_TIMESTAMP + 1000),
        )
        .await
        .unwrap();

    let mut groups = 0;
    while let Some(_row) = rows.next().await.unwrap() {
        groups += 1;
    }

    black_box(groups);
}

fn criterion_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    // Setup benchmark data once
    let (db, user_id, _temp_dir) = rt.block_on(setup_benchmark_environment());
    rt.block_on(create_benchmark_transactions(
        &db,
        &user_id,
        BENCH_TRANSACTION_COUNT,
    ));

    c.bench_function("list_transactions", |b| {
        b.to_async(&rt).iter(|| benchmark_list_query(&db, &user_id))
    });

    c.bench_function("expense_sum", |b| {
        b.to_async(&rt).iter(|| benchmark_expense_sum(&db, &user_id))
    });

    c.bench_function("category_breakdown", |b| {
        b.to_async(&rt)
            .iter(|| benchmark_category_breakdown(&db, &user_id))
    });

    // Keep temp_dir alive until the end
    std::mem::forget(_temp_dir);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
