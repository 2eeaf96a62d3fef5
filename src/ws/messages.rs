//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Notification;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client pushed event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send over WebSocket.
///
/// The channel is push-only for swap events; commands exist for liveness
/// and to confirm which user the connection is bound to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Liveness check; answered with `pong`.
    Ping,
    /// Returns the user the connection receives events for.
    Whoami,
}

impl WsMessage {
    /// Wraps a notification as an `event` message.
    ///
    /// The payload is the flattened [`crate::domain::SwapEvent`]: its
    /// `event` field carries the wire name (`newSwapRequest`, …).
    #[must_use]
    pub fn event(notification: &Notification) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload: serde_json::to_value(&notification.event).unwrap_or_default(),
        }
    }

    /// Builds a `response` to the command with the given `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an `error` message.
    #[must_use]
    pub fn error(id: String, code: u16, message: &str) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::json!({
                "code": code,
                "message": message,
            }),
        }
    }
}
