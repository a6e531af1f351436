//! Read-only views over hosts, check history and alerts

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
    },
    models::ServiceId,
};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    /// Max results (default: 100, at most 1000)
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> ApiResult<usize> {
        match self.limit {
            None => Ok(DEFAULT_LIMIT),
            Some(0) => Err(ApiError::InvalidRequest(
                "limit must be greater than 0".to_string(),
            )),
            Some(limit) => Ok(limit.min(MAX_LIMIT)),
        }
    }
}

/// GET /api/v1/hosts
pub async fn list_hosts(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let hosts = state.store.list_hosts().await?;

    Ok(Json(json!({
        "count": hosts.len(),
        "hosts": hosts,
    })))
}

/// GET /api/v1/services/:id/checks
///
/// Check history of one service, newest first
pub async fn get_service_checks(
    State(state): State<ApiState>,
    Path(service_id): Path<ServiceId>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.resolve()?;
    let checks = state.store.check_history(service_id, limit).await?;

    Ok(Json(json!({
        "service_id": service_id,
        "count": checks.len(),
        "checks": checks,
    })))
}

/// GET /api/v1/alerts
///
/// Most recent alerts, newest first
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let limit = query.resolve()?;
    let alerts = state.store.recent_alerts(limit).await?;

    Ok(Json(json!({
        "count": alerts.len(),
        "alerts": alerts,
    })))
}
