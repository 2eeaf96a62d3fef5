//! Outbound notification interface.
//!
//! The swap engine depends only on [`NotificationSink`]; any transport
//! (broadcast bus, socket rooms, pub/sub) can sit behind it.

use std::fmt;

use super::{SwapEvent, UserId};

/// Failure reported by a [`NotificationSink`]. Never fails an operation.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The delivery channel has shut down.
    #[error("notification channel closed")]
    Closed,

    /// Transport-specific delivery failure.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Destination for domain events addressed to a single user.
///
/// Implementations must not block; delivery is best-effort.
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Pushes `event` to `target`.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the event could not be handed to the
    /// transport. Callers log and discard it.
    fn push(&self, target: UserId, event: SwapEvent) -> Result<(), NotifyError>;
}
