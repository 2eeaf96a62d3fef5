//! Slot DTOs for create and update.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::{NewSlot, SlotPatch, SlotStatus};

/// Request body for `POST /slots`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSlotRequest {
    /// Title (1–200 characters after trimming).
    pub title: String,
    /// Start of the interval (ISO-8601).
    pub start: DateTime<Utc>,
    /// End of the interval (ISO-8601), strictly after `start`.
    pub end: DateTime<Utc>,
    /// Optional location.
    #[serde(default)]
    pub location: Option<String>,
    /// Initial status, `BUSY` or `SWAPPABLE`. Defaults to `BUSY`.
    #[serde(default = "default_status")]
    pub status: SlotStatus,
}

const fn default_status() -> SlotStatus {
    SlotStatus::Busy
}

impl From<CreateSlotRequest> for NewSlot {
    fn from(req: CreateSlotRequest) -> Self {
        Self {
            title: req.title,
            start: req.start,
            end: req.end,
            location: req.location,
            status: req.status,
        }
    }
}

/// Request body for `PATCH /slots/{id}`. Omitted fields are unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSlotRequest {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New start.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// New end.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    /// New location.
    #[serde(default)]
    pub location: Option<String>,
    /// New status, `BUSY` or `SWAPPABLE`.
    #[serde(default)]
    pub status: Option<SlotStatus>,
}

impl From<UpdateSlotRequest> for SlotPatch {
    fn from(req: UpdateSlotRequest) -> Self {
        Self {
            title: req.title,
            start: req.start,
            end: req.end,
            location: req.location,
            status: req.status,
        }
    }
}
