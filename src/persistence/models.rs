//! Database row models for slots and swap requests.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Slot, SlotId, SwapRequest, SwapRequestId, UserId};
use crate::error::SwapError;

/// Column list shared by every `slots` query.
pub const SLOT_COLUMNS: &str =
    "id, title, starts_at, ends_at, location, owner_id, status, created_at, updated_at";

/// Column list shared by every `swap_requests` query.
pub const REQUEST_COLUMNS: &str = "id, requester_id, requester_slot_id, target_owner_id, \
     target_slot_id, status, created_at, resolved_at";

/// A row from the `slots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlotRow {
    /// Slot id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Interval start.
    pub starts_at: DateTime<Utc>,
    /// Interval end.
    pub ends_at: DateTime<Utc>,
    /// Optional location.
    pub location: Option<String>,
    /// Owner id.
    pub owner_id: Uuid,
    /// Status in stored form (e.g. `"SWAPPABLE"`).
    pub status: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SlotRow> for Slot {
    type Error = SwapError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SlotId::from_uuid(row.id),
            title: row.title,
            start: row.starts_at,
            end: row.ends_at,
            location: row.location,
            owner: UserId::from_uuid(row.owner_id),
            status: row
                .status
                .parse()
                .map_err(|_| SwapError::Persistence(format!("bad slot status {}", row.status)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `swap_requests` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SwapRequestRow {
    /// Request id.
    pub id: Uuid,
    /// Proposing user.
    pub requester_id: Uuid,
    /// Offered slot.
    pub requester_slot_id: Uuid,
    /// Addressed user.
    pub target_owner_id: Uuid,
    /// Wanted slot.
    pub target_slot_id: Uuid,
    /// Status in stored form (e.g. `"PENDING"`).
    pub status: String,
    /// Proposal timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<SwapRequestRow> for SwapRequest {
    type Error = SwapError;

    fn try_from(row: SwapRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SwapRequestId::from_uuid(row.id),
            requester: UserId::from_uuid(row.requester_id),
            requester_slot: SlotId::from_uuid(row.requester_slot_id),
            target_owner: UserId::from_uuid(row.target_owner_id),
            target_slot: SlotId::from_uuid(row.target_slot_id),
            status: row.status.parse().map_err(|_| {
                SwapError::Persistence(format!("bad swap request status {}", row.status))
            })?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}
