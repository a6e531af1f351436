//! Endpoints used by the remote collector

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    api::{error::ApiResult, state::ApiState},
    ingest::{AgentReport, ServiceList},
};

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    token: String,
}

/// POST /api/agent/report
///
/// Accept one batch report. Unknown tokens get `401` before anything is
/// written.
pub async fn receive_report(
    State(state): State<ApiState>,
    Json(report): Json<AgentReport>,
) -> ApiResult<Json<Value>> {
    let receipt = state.ingestor.ingest(report).await?;
    debug!(
        "accepted report for host {} ({} checks)",
        receipt.host_id, receipt.checks_written
    );

    Ok(Json(json!({
        "message": "Report received",
    })))
}

/// GET /api/agent/services?token=T
///
/// Enabled services the agent should probe
pub async fn list_agent_services(
    State(state): State<ApiState>,
    Query(query): Query<TokenQuery>,
) -> ApiResult<Json<ServiceList>> {
    Ok(Json(state.ingestor.enabled_services(&query.token).await?))
}
