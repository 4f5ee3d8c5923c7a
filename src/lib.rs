//! Personal finance tracker backend: users with a running balance, a
//! transaction ledger, and monthly budgets, behind a REST JSON API.

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;

pub mod budget;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod health;
pub mod models;
pub mod reconcile;
pub mod state;
pub mod transactions;
pub mod users;
pub mod utils;

pub use state::AppState;

/// Assembles the API router. Shared between the server binary and tests.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/user", post(users::create_user))
        .route("/user/login", post(users::login))
        .route("/user/{id}", get(users::get_user).put(users::update_user))
        .route("/user/{id}/balance", post(users::update_balance))
        .route(
            "/transactions/{user_id}",
            get(transactions::get_transactions).post(transactions::create_transaction),
        )
        .route(
            "/transactions/{user_id}/stats",
            get(transactions::get_transaction_stats),
        )
        .route(
            "/transactions/{user_id}/{id}",
            get(transactions::get_transaction)
                .put(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route(
            "/budget/{user_id}",
            get(budget::get_budget).post(budget::create_or_update_budget),
        )
        .route("/budget/{user_id}/stats", get(budget::get_budget_stats))
        .route("/budget/{user_id}/history", get(budget::get_budget_history))
        .route(
            "/budget/{user_id}/{month}/{year}",
            delete(budget::delete_budget),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
