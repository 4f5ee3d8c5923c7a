use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::constants::*;
use crate::error::ApiError;

/// Checks an id is a well-formed UUID before it reaches a query.
pub fn validate_id(id: &str, label: &str) -> Result<(), ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::InvalidInput(format!("Invalid {label}")))?;
    Ok(())
}

/// Parses an RFC 3339 timestamp from a request field.
pub fn parse_rfc3339(value: &str, label: &str) -> Result<OffsetDateTime, ApiError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|_| {
        ApiError::InvalidInput(format!(
            "{label} must be an ISO-8601 timestamp, got \"{value}\""
        ))
    })
}

pub fn validate_amount(amount: f64) -> Result<(), ApiError> {
    if !amount.is_finite() || amount < MIN_TRANSACTION_AMOUNT {
        return Err(ApiError::InvalidInput(
            "Amount must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Expense categories come from a fixed set; income categories are free-form
/// but must not be blank.
pub fn validate_category(category: &str, is_expense: bool) -> Result<(), ApiError> {
    if category.trim().is_empty() {
        return Err(ApiError::InvalidInput(
            "Category cannot be empty".to_string(),
        ));
    }
    if is_expense && !EXPENSE_CATEGORIES.contains(&category) {
        return Err(ApiError::InvalidInput(format!(
            "Expense category must be one of: {}",
            EXPENSE_CATEGORIES.join(", ")
        )));
    }
    Ok(())
}

pub fn validate_string_length(value: &str, field_name: &str, max_length: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{field_name} cannot be empty")));
    }
    if value.len() > max_length {
        return Err(ApiError::InvalidInput(format!(
            "{field_name} must be less than {max_length} characters"
        )));
    }
    Ok(())
}

pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, ApiError> {
    match limit {
        Some(0) => Err(ApiError::InvalidInput(
            "Limit must be greater than 0".to_string(),
        )),
        Some(l) if l > MAX_LIMIT => Err(ApiError::InvalidInput(format!(
            "Limit cannot exceed {MAX_LIMIT}"
        ))),
        Some(l) => Ok(l),
        None => Ok(default),
    }
}

pub fn validate_page(page: Option<u32>) -> Result<u32, ApiError> {
    match page {
        Some(0) => Err(ApiError::InvalidInput(
            "Page must be greater than 0".to_string(),
        )),
        Some(p) => Ok(p),
        None => Ok(DEFAULT_PAGE),
    }
}
