// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "5000";
pub const DEFAULT_DATA_PATH: &str = "data";

// Query limits and defaults
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const DEFAULT_HISTORY_LIMIT: u32 = 12;
pub const MAX_LIMIT: u32 = 1000;

// Validation limits
pub const MIN_TRANSACTION_AMOUNT: f64 = 0.01;
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Allowed categories for expense transactions and budget sub-allocations.
/// Income categories are free-form.
pub const EXPENSE_CATEGORIES: [&str; 6] =
    ["Rent", "Food", "Travel", "Groceries", "Shopping", "Others"];

// Error messages
pub const ERR_INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const ERR_USER_NOT_FOUND: &str = "User not found";
pub const ERR_TRANSACTION_NOT_FOUND: &str = "Transaction not found";
pub const ERR_BUDGET_NOT_FOUND: &str = "Budget not found";
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
