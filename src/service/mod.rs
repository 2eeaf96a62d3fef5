//! Service layer: business logic orchestration.
//!
//! [`SlotService`] is the slot registry. [`SwapService`] runs the two-phase
//! swap protocol against the [`crate::ledger::Ledger`] and emits events
//! through a [`crate::domain::NotificationSink`].

pub mod slot_service;
pub mod swap_service;

pub use slot_service::SlotService;
pub use swap_service::{SwapRequestLists, SwapService};
