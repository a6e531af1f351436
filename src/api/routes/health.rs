//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState};

/// GET /api/v1/health
///
/// Reports storage health; `503` when the backend is not operational
pub async fn health_check(State(state): State<ApiState>) -> ApiResult<(StatusCode, Json<Value>)> {
    let health = state.store.health_check().await?;

    let status = if health.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((
        status,
        Json(json!({
            "status": if health.healthy { "ok" } else { "degraded" },
            "storage": health.message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    ))
}
