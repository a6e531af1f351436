//! HTTP surface of the hub
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared state** holding the store and the push ingestor
//!
//! ## Endpoints
//!
//! - `POST /api/agent/report` - Agent batch report
//! - `GET /api/agent/services?token=` - Enabled services for an agent
//! - `GET /api/v1/health` - Storage health
//! - `GET /api/v1/hosts` - Hosts with connection status
//! - `GET /api/v1/services/{id}/checks` - Check history
//! - `GET /api/v1/alerts` - Recent alerts

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl ApiConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            enable_cors: true,
        }
    }
}

/// Build the router with all routes
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/agent/report", post(routes::agent::receive_report))
        .route(
            "/api/agent/services",
            get(routes::agent::list_agent_services),
        )
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/hosts", get(routes::inventory::list_hosts))
        .route(
            "/api/v1/services/:id/checks",
            get(routes::inventory::get_service_checks),
        )
        .route("/api/v1/alerts", get(routes::inventory::list_alerts))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task that stops
/// accepting connections once `cancel` fires. Returns the server's local
/// address.
pub async fn spawn_api_server(
    config: ApiConfig,
    state: ApiState,
    cancel: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
