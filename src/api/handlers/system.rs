//! System endpoints: liveness and live subscriber count.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;

/// Liveness payload.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
    /// Open notification subscriptions (WebSocket sessions).
    ws_connections: usize,
}

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Reports liveness, build version and the number of open notification streams. Needs no caller identity.",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
        ws_connections: state.event_bus.receiver_count(),
    })
}

/// Routes served outside `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
