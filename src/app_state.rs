//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::{EventBus, NotificationSink};
use crate::ledger::Ledger;
use crate::service::{SlotService, SwapService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Slot registry.
    pub slot_service: Arc<SlotService>,
    /// Swap negotiation engine.
    pub swap_service: Arc<SwapService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires both services over one ledger, with `event_bus` as the
    /// notification sink.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, event_bus: EventBus) -> Self {
        let notifier: Arc<dyn NotificationSink> = Arc::new(event_bus.clone());
        Self {
            slot_service: Arc::new(SlotService::new(Arc::clone(&ledger))),
            swap_service: Arc::new(SwapService::new(ledger, notifier)),
            event_bus,
        }
    }
}
