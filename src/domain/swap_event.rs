//! Domain events emitted after swap negotiation commits.
//!
//! Each [`SwapEvent`] is addressed to one user through the
//! [`super::NotificationSink`]. Payloads are hints: receivers should
//! re-query authoritative state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{SwapRequest, UserId};

/// Domain event describing a change to a swap request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SwapEvent {
    /// A swap was proposed to the recipient.
    NewSwapRequest {
        /// The pending request.
        request: SwapRequest,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The recipient's proposal was answered.
    SwapResponse {
        /// The resolved request.
        request: SwapRequest,
        /// Whether the target owner accepted.
        accepted: bool,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Echo to the responder so their other sessions refresh.
    SwapResolved {
        /// The resolved request.
        request: SwapRequest,
        /// Whether the request was accepted.
        accepted: bool,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl SwapEvent {
    /// Returns the request carried by this event.
    #[must_use]
    pub const fn request(&self) -> &SwapRequest {
        match self {
            Self::NewSwapRequest { request, .. }
            | Self::SwapResponse { request, .. }
            | Self::SwapResolved { request, .. } => request,
        }
    }

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::NewSwapRequest { .. } => "newSwapRequest",
            Self::SwapResponse { .. } => "swapResponse",
            Self::SwapResolved { .. } => "swapResolved",
        }
    }
}

/// A [`SwapEvent`] addressed to a single user.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Recipient.
    pub target: UserId,
    /// Event payload.
    #[serde(flatten)]
    pub event: SwapEvent,
}
