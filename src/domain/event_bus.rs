//! Broadcast channel for user-addressed notifications.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The swap engine
//! pushes a [`Notification`] per recipient, and every WebSocket connection
//! subscribes and keeps only the notifications addressed to its user.

use tokio::sync::broadcast;

use super::{Notification, NotificationSink, NotifyError, SwapEvent, UserId};

/// Largest accepted channel capacity; `tokio::sync::broadcast` panics above
/// `usize::MAX / 2`.
pub const MAX_CAPACITY: usize = 1 << 20;

/// Broadcast bus for [`Notification`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity, clamped to
    /// `1..=MAX_CAPACITY`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_CAPACITY));
        Self { sender }
    }

    /// Publishes a notification to all subscribers.
    ///
    /// Returns the number of receivers that received it.
    /// If there are no active receivers, the notification is silently dropped.
    pub fn publish(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future notifications.
    ///
    /// Each WebSocket connection should call this once on connect.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for EventBus {
    fn push(&self, target: UserId, event: SwapEvent) -> Result<(), NotifyError> {
        let delivered = self.publish(Notification { target, event });
        tracing::trace!(%target, delivered, "notification published");
        Ok(())
    }
}
