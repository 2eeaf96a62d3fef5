//! Domain layer: core types, events, and the notification interface.
//!
//! This module contains the server-side domain model: typed identifiers,
//! slots and swap requests with their status machines, the events emitted
//! after a swap transaction commits, and the [`EventBus`] that fans them out
//! to connected users.

pub mod event_bus;
pub mod ids;
pub mod notifier;
pub mod slot;
pub mod swap_event;
pub mod swap_request;

pub use event_bus::EventBus;
pub use ids::{SlotId, SwapRequestId, UserId};
pub use notifier::{NotificationSink, NotifyError};
pub use slot::{NewSlot, Slot, SlotPatch, SlotStatus};
pub use swap_event::{Notification, SwapEvent};
pub use swap_request::{SwapRequest, SwapStatus};
