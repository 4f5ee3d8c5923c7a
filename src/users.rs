use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use libsql::Connection;
use uuid::Uuid;

use crate::constants::*;
use crate::database::Db;
use crate::error::ApiError;
use crate::models::{
    AdjustBalancePayload, ApiResponse, BalanceResponse, LoginPayload, PublicUser, RegisterPayload,
    TransactionKind, UpdateUserPayload, User,
};
use crate::reconcile;
use crate::state::AppState;
use crate::utils::{validate_amount, validate_string_length};

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to hash password: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to parse password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn extract_user_from_row(row: libsql::Row) -> Result<User, ApiError> {
    Ok(User {
        id: row.get(0).map_err(ApiError::db("failed to get user id"))?,
        name: row.get(1).map_err(ApiError::db("failed to get user name"))?,
        email: row.get(2).map_err(ApiError::db("failed to get user email"))?,
        password_hash: row
            .get(3)
            .map_err(ApiError::db("failed to get user password hash"))?,
        balance: row
            .get(4)
            .map_err(ApiError::db("failed to get user balance"))?,
    })
}

pub async fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>, ApiError> {
    let mut rows = conn
        .query(
            "SELECT id, name, email, password_hash, balance FROM users WHERE id = ?",
            [id],
        )
        .await
        .map_err(ApiError::db("failed to query user"))?;

    match rows
        .next()
        .await
        .map_err(ApiError::db("failed to read user row"))?
    {
        Some(row) => Ok(Some(extract_user_from_row(row)?)),
        None => Ok(None),
    }
}

async fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, ApiError> {
    let mut rows = conn
        .query(
            "SELECT id, name, email, password_hash, balance FROM users WHERE email = ?",
            [email],
        )
        .await
        .map_err(ApiError::db("failed to query user"))?;

    match rows
        .next()
        .await
        .map_err(ApiError::db("failed to read user row"))?
    {
        Some(row) => Ok(Some(extract_user_from_row(row)?)),
        None => Ok(None),
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::InvalidInput(
            "A valid email address is required".to_string(),
        ));
    }
    Ok(())
}

/// Creates an account with a zero starting balance.
pub async fn register_user(db: &Db, payload: RegisterPayload) -> Result<PublicUser, ApiError> {
    validate_string_length(&payload.name, "Name", MAX_NAME_LENGTH)?;
    validate_email(&payload.email)?;
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }

    let hash = hash_password(&payload.password)?;
    let id = Uuid::new_v4().to_string();
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_string();

    // Single write connection for the existence check and the insert; the
    // UNIQUE constraint on email backstops the race anyway.
    let conn = db.write().await;
    if get_user_by_email(&conn, &email).await?.is_some() {
        return Err(ApiError::Conflict("User already exists".to_string()));
    }

    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, balance) VALUES (?, ?, ?, ?, 0)",
        (id.as_str(), name.as_str(), email.as_str(), hash.as_str()),
    )
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::Conflict("User already exists".to_string())
        } else {
            ApiError::Database(format!("failed to create user: {e}"))
        }
    })?;

    Ok(PublicUser {
        id,
        name,
        email,
        balance: 0.0,
    })
}

pub async fn authenticate(db: &Db, payload: LoginPayload) -> Result<PublicUser, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::InvalidInput(
            "Email and password are required".to_string(),
        ));
    }

    let user = {
        let conn = db.read().await;
        get_user_by_email(&conn, payload.email.trim()).await?
    };

    // Same error whether the email is unknown or the password is wrong.
    let user = user.ok_or_else(|| ApiError::InvalidCredentials(ERR_INVALID_CREDENTIALS.into()))?;
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::InvalidCredentials(ERR_INVALID_CREDENTIALS.into()));
    }

    Ok(user.into_public())
}

pub async fn fetch_profile(db: &Db, user_id: &str) -> Result<PublicUser, ApiError> {
    let conn = db.read().await;
    let user = get_user_by_id(&conn, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;
    Ok(user.into_public())
}

/// Edits name/email/password, gated by re-entry of the current password.
pub async fn update_profile(
    db: &Db,
    user_id: &str,
    payload: UpdateUserPayload,
) -> Result<PublicUser, ApiError> {
    let conn = db.write().await;
    let user = get_user_by_id(&conn, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(ApiError::InvalidCredentials(
            "Invalid current password".to_string(),
        ));
    }

    let name = match payload.name {
        Some(name) => {
            validate_string_length(&name, "Name", MAX_NAME_LENGTH)?;
            name.trim().to_string()
        }
        None => user.name,
    };
    let email = match payload.email {
        Some(email) => {
            validate_email(&email)?;
            email.trim().to_string()
        }
        None => user.email,
    };
    let password_hash = match payload.new_password {
        Some(new_password) => {
            if new_password.len() < MIN_PASSWORD_LENGTH {
                return Err(ApiError::InvalidInput(format!(
                    "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
                )));
            }
            hash_password(&new_password)?
        }
        None => user.password_hash,
    };

    conn.execute(
        "UPDATE users SET name = ?, email = ?, password_hash = ? WHERE id = ?",
        (name.as_str(), email.as_str(), password_hash.as_str(), user_id),
    )
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint failed") {
            ApiError::Conflict("Email already in use".to_string())
        } else {
            ApiError::Database(format!("failed to update user: {e}"))
        }
    })?;

    Ok(PublicUser {
        id: user.id,
        name,
        email,
        balance: user.balance,
    })
}

/// Direct balance adjustment. Bypasses the ledger on purpose: no transaction
/// record is written, only the running balance moves.
pub async fn adjust_balance(
    db: &Db,
    user_id: &str,
    payload: AdjustBalancePayload,
) -> Result<f64, ApiError> {
    let kind = TransactionKind::parse(&payload.kind)?;
    validate_amount(payload.amount)?;

    let conn = db.write().await;
    let user = get_user_by_id(&conn, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(ERR_USER_NOT_FOUND.into()))?;

    let new_balance = reconcile::balance_after_create(user.balance, kind, payload.amount)?;

    conn.execute(
        "UPDATE users SET balance = ? WHERE id = ?",
        (new_balance, user_id),
    )
    .await
    .map_err(ApiError::db("failed to update balance"))?;

    Ok(new_balance)
}

// --- Handlers ---

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<ApiResponse<PublicUser>>), ApiError> {
    let user = register_user(&state.db, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("User created successfully", user)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user = authenticate(&state.db, payload).await?;
    Ok(Json(ApiResponse::data(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user = fetch_profile(&state.db, &user_id).await?;
    Ok(Json(ApiResponse::data(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateUserPayload>,
) -> Result<Json<ApiResponse<PublicUser>>, ApiError> {
    let user = update_profile(&state.db, &user_id, payload).await?;
    Ok(Json(ApiResponse::with_message(
        "Profile updated successfully",
        user,
    )))
}

pub async fn update_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<AdjustBalancePayload>,
) -> Result<Json<ApiResponse<BalanceResponse>>, ApiError> {
    let balance = adjust_balance(&state.db, &user_id, payload).await?;
    Ok(Json(ApiResponse::data(BalanceResponse { balance })))
}
