//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! answering commands and forwarding the user's notifications.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage};
use crate::domain::{Notification, UserId};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and answers them.
/// - Forwards notifications targeted at `user` from the
///   [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<Notification>,
    user: UserId,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, user);
                        if let Some(json) = reply
                            && ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(notification) => {
                        if notification.target != user {
                            continue;
                        }
                        let json = serde_json::to_string(&WsMessage::event(&notification))
                            .unwrap_or_default();
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%user, lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(%user, "ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON reply.
fn handle_text_message(text: &str, user: UserId) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return serde_json::to_string(&WsMessage::error(String::new(), 400, "malformed JSON"))
            .ok();
    };

    let reply = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(WsCommand::Ping) => WsMessage::response(msg.id, serde_json::json!({ "pong": true })),
        Ok(WsCommand::Whoami) => {
            WsMessage::response(msg.id, serde_json::json!({ "user_id": user }))
        }
        Err(_) => WsMessage::error(msg.id, 404, "unknown command"),
    };
    serde_json::to_string(&reply).ok()
}
