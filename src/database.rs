use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    name           TEXT    NOT NULL,
    email          TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL,
    balance        REAL    NOT NULL DEFAULT 0
);
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id           TEXT    PRIMARY KEY,
    user_id      TEXT    NOT NULL REFERENCES users(id),
    amount       REAL    NOT NULL,
    kind         TEXT    NOT NULL CHECK (kind IN ('income', 'expense')),
    category     TEXT    NOT NULL,
    description  TEXT    NOT NULL DEFAULT '',
    date         INTEGER NOT NULL
);
"#;

const CREATE_TRANSACTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_user_date
    ON transactions (user_id, date DESC);
"#;

const CREATE_BUDGETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS budgets (
    id                TEXT    PRIMARY KEY,
    user_id           TEXT    NOT NULL REFERENCES users(id),
    month             INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
    year              INTEGER NOT NULL,
    total_budget      REAL    NOT NULL DEFAULT 0,
    spent_amount      REAL    NOT NULL DEFAULT 0,
    remaining_budget  REAL    NOT NULL DEFAULT 0,
    categories        TEXT    NOT NULL DEFAULT '[]',
    UNIQUE (user_id, month, year)
);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Opens (creating if needed) the finance database under `data_dir` and runs
/// the schema migrations.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("finance.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_INDEX, ()).await?;
    conn.execute(CREATE_BUDGETS_TABLE, ()).await?;

    Ok(Arc::new(RwLock::new(conn)))
}

/// Round-trips a trivial query to check the storage connection is alive.
pub async fn ping(db: &Db) -> Result<()> {
    let conn = db.read().await;
    let mut rows = conn.query("SELECT 1", ()).await?;
    rows.next().await?;
    Ok(())
}
