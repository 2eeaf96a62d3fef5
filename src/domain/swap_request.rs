//! Two-party swap proposal and its monotonic status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Slot, SlotId, SwapRequestId, UserId};
use crate::error::SwapError;

/// Lifecycle status of a [`SwapRequest`].
///
/// `Pending → Accepted` or `Pending → Rejected`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    /// Awaiting a response from the target owner.
    Pending,
    /// Ownership of both slots was exchanged.
    Accepted,
    /// The proposal was declined; both slots were released.
    Rejected,
}

impl SwapStatus {
    /// Returns the stored string form of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Returns `true` for `Accepted` and `Rejected`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(SwapError::validation(format!("unknown swap status: {other}"))),
        }
    }
}

/// A proposal to exchange ownership of two slots.
///
/// Never deleted: resolved requests remain as an audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SwapRequest {
    /// Request identifier.
    pub id: SwapRequestId,
    /// User who proposed the swap.
    pub requester: UserId,
    /// Slot offered by the requester.
    pub requester_slot: SlotId,
    /// Owner of the target slot at proposal time.
    pub target_owner: UserId,
    /// Slot the requester wants.
    pub target_slot: SlotId,
    /// Current status.
    pub status: SwapStatus,
    /// Proposal timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp, set on the terminal transition.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SwapRequest {
    /// Creates a pending request between the owners of `mine` and `theirs`.
    #[must_use]
    pub fn pending(mine: &Slot, theirs: &Slot) -> Self {
        Self {
            id: SwapRequestId::new(),
            requester: mine.owner,
            requester_slot: mine.id,
            target_owner: theirs.owner,
            target_slot: theirs.id,
            status: SwapStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns a resolved copy with the given terminal status.
    #[must_use]
    pub fn resolved(&self, accepted: bool) -> Self {
        Self {
            status: if accepted {
                SwapStatus::Accepted
            } else {
                SwapStatus::Rejected
            },
            resolved_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    /// Returns `true` if the request references `slot` on either side.
    #[must_use]
    pub fn references(&self, slot: SlotId) -> bool {
        self.requester_slot == slot || self.target_slot == slot
    }

    /// Returns both referenced slot ids, requester side first.
    #[must_use]
    pub const fn slots(&self) -> [SlotId; 2] {
        [self.requester_slot, self.target_slot]
    }
}
