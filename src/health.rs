use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::database;
use crate::models::ApiResponse;
use crate::state::AppState;

#[derive(Serialize, Debug)]
pub struct HealthInfo {
    pub status: &'static str,
    pub timestamp: String,
    pub database: DatabaseHealth,
    pub uptime_seconds: u64,
}

#[derive(Serialize, Debug)]
pub struct DatabaseHealth {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness/readiness of the process and its storage connection. Returns 503
/// when the store does not answer a ping, so load balancers stop routing
/// mutating requests here.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<HealthInfo>>) {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let uptime_seconds = state.started_at.elapsed().as_secs();

    match database::ping(&state.db).await {
        Ok(()) => {
            let info = HealthInfo {
                status: "healthy",
                timestamp,
                database: DatabaseHealth {
                    state: "connected",
                    error: None,
                },
                uptime_seconds,
            };
            (StatusCode::OK, Json(ApiResponse::data(info)))
        }
        Err(e) => {
            tracing::error!("storage ping failed: {e:#}");
            let info = HealthInfo {
                status: "unhealthy",
                timestamp,
                database: DatabaseHealth {
                    state: "disconnected",
                    error: Some(e.to_string()),
                },
                uptime_seconds,
            };
            let mut response = ApiResponse::data(info);
            response.success = false;
            (StatusCode::SERVICE_UNAVAILABLE, Json(response))
        }
    }
}
