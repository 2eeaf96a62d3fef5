//! WebSocket layer: per-user push channel for swap notifications.
//!
//! The endpoint at `/ws` binds each connection to one user and forwards
//! the [`crate::domain::Notification`]s addressed to that user.

pub mod connection;
pub mod handler;
pub mod messages;
