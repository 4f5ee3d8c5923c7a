use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ApiError;

/// JSON envelope shared by every endpoint:
/// `{ success: bool, data?: ..., message?: string }`.
#[derive(Serialize, Debug)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: f64,
}

impl User {
    pub fn into_public(self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name,
            email: self.email,
            balance: self.balance,
        }
    }
}

/// The user projection returned to clients. Never carries the password hash.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub balance: f64,
}

/// Transaction classification. Income raises the balance, expense lowers it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            _ => Err(ApiError::InvalidInput(
                "Type must be either \"income\" or \"expense\"".to_string(),
            )),
        }
    }

    /// Effect of this kind on the running balance.
    pub fn sign(self) -> f64 {
        match self {
            TransactionKind::Income => 1.0,
            TransactionKind::Expense => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// Per-category sub-allocation on a budget. Stored and returned as-is;
/// not cross-checked against actual category spending.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAllocation {
    pub name: String,
    pub budget_amount: f64,
    #[serde(default)]
    pub spent_amount: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub user_id: String,
    pub month: u8,
    pub year: i32,
    pub total_budget: f64,
    pub spent_amount: f64,
    pub remaining_budget: f64,
    pub categories: Vec<CategoryAllocation>,
}

// --- Request payloads ---

#[derive(Deserialize, Debug)]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Current password, required to authorize the edit.
    pub password: String,
    pub new_password: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct AdjustBalancePayload {
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateTransactionPayload {
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub description: Option<String>,
    /// RFC 3339 timestamp; defaults to now.
    pub date: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateTransactionPayload {
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub month: Option<u8>,
    pub year: Option<i32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BudgetQuery {
    pub month: Option<u8>,
    pub year: Option<i32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBudgetPayload {
    pub total_budget: f64,
    pub categories: Option<Vec<CategoryAllocation>>,
    pub month: Option<u8>,
    pub year: Option<i32>,
}

// --- Response shapes ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total_pages: u32,
    pub current_page: u32,
    pub total: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
    pub total_transactions: u32,
    pub income_transactions: u32,
    pub expense_transactions: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransactionWithBalance {
    pub transaction: Transaction,
    pub new_balance: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeletedTransaction {
    pub deleted_transaction: Transaction,
    pub new_balance: f64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpending {
    pub category: String,
    pub total_spent: f64,
    pub transaction_count: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BudgetOverview {
    pub total_budget: f64,
    pub spent_amount: f64,
    pub remaining_budget: f64,
    pub percentage_used: f64,
    pub category_breakdown: Vec<CategorySpending>,
    pub month: u8,
    pub year: i32,
}

#[derive(Serialize, Debug)]
pub struct BalanceResponse {
    pub balance: f64,
}
