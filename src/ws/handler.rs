//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::api::identity::{caller_from_headers, parse_user_id};
use crate::app_state::AppState;
use crate::error::SwapError;

/// Query parameters accepted by `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Caller id for clients that cannot set headers on the upgrade.
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `GET /ws` — Upgrade HTTP connection to WebSocket.
///
/// The connection receives every notification addressed to the caller,
/// identified by the `x-user-id` header or the `user_id` query parameter.
///
/// # Errors
///
/// Returns [`SwapError::Validation`] if no well-formed caller id is given.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, SwapError> {
    let user = match params.user_id.as_deref() {
        Some(raw) => parse_user_id(raw)?,
        None => caller_from_headers(&headers)?,
    };
    let event_rx = state.event_bus.subscribe();
    tracing::debug!(%user, "ws upgrade");

    Ok(ws.on_upgrade(move |socket| run_connection(socket, event_rx, user)))
}
