//! Time slot entity and its exchangeability status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{SlotId, UserId};
use crate::error::SwapError;

/// Maximum accepted title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;

/// Exchangeability status of a [`Slot`].
///
/// `Busy ⇄ Swappable` is toggled by the owner. `ReservedForSwap` is only
/// entered and left by the swap engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Not offered for exchange.
    Busy,
    /// Offered for exchange.
    Swappable,
    /// Held by exactly one pending swap request.
    ReservedForSwap,
}

impl SlotStatus {
    /// Returns the stored string form of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Busy => "BUSY",
            Self::Swappable => "SWAPPABLE",
            Self::ReservedForSwap => "RESERVED_FOR_SWAP",
        }
    }

    /// Returns `true` for the statuses an owner may set directly.
    #[must_use]
    pub const fn is_owner_settable(&self) -> bool {
        matches!(self, Self::Busy | Self::Swappable)
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUSY" => Ok(Self::Busy),
            "SWAPPABLE" => Ok(Self::Swappable),
            "RESERVED_FOR_SWAP" => Ok(Self::ReservedForSwap),
            other => Err(SwapError::validation(format!("unknown slot status: {other}"))),
        }
    }
}

/// A bounded time interval with a single owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Slot {
    /// Slot identifier (immutable after creation).
    pub id: SlotId,
    /// Short description shown on calendars.
    pub title: String,
    /// Inclusive start of the interval.
    pub start: DateTime<Utc>,
    /// Exclusive end of the interval.
    pub end: DateTime<Utc>,
    /// Free-form location.
    pub location: Option<String>,
    /// Current owner. Changes only when a swap is accepted.
    pub owner: UserId,
    /// Exchangeability status.
    pub status: SlotStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new slot.
#[derive(Debug, Clone)]
pub struct NewSlot {
    /// Title.
    pub title: String,
    /// Start of the interval.
    pub start: DateTime<Utc>,
    /// End of the interval.
    pub end: DateTime<Utc>,
    /// Optional location.
    pub location: Option<String>,
    /// Initial status; must be `Busy` or `Swappable`.
    pub status: SlotStatus,
}

/// Partial update of a slot. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SlotPatch {
    /// New title.
    pub title: Option<String>,
    /// New start.
    pub start: Option<DateTime<Utc>>,
    /// New end.
    pub end: Option<DateTime<Utc>>,
    /// New location.
    pub location: Option<String>,
    /// New status; must be `Busy` or `Swappable`.
    pub status: Option<SlotStatus>,
}

impl SlotPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.location.is_none()
            && self.status.is_none()
    }
}

impl Slot {
    /// Builds a validated slot owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Validation`] if the title is blank or too long,
    /// the interval is empty or inverted, or the status is
    /// `ReservedForSwap`.
    pub fn create(owner: UserId, fields: NewSlot) -> Result<Self, SwapError> {
        let now = Utc::now();
        let slot = Self {
            id: SlotId::new(),
            title: fields.title.trim().to_string(),
            start: fields.start,
            end: fields.end,
            location: normalize_location(fields.location),
            owner,
            status: fields.status,
            created_at: now,
            updated_at: now,
        };
        slot.validate()?;
        Ok(slot)
    }

    /// Returns a copy of this slot with `patch` applied and validated.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Validation`] under the same rules as
    /// [`Slot::create`].
    pub fn patched(&self, patch: &SlotPatch) -> Result<Self, SwapError> {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.trim().to_string();
        }
        if let Some(start) = patch.start {
            next.start = start;
        }
        if let Some(end) = patch.end {
            next.end = end;
        }
        if patch.location.is_some() {
            next.location = normalize_location(patch.location.clone());
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        next.updated_at = Utc::now();
        next.validate()?;
        Ok(next)
    }

    /// Returns a copy with a new owner and status, as written by the engine.
    #[must_use]
    pub fn transitioned(&self, owner: UserId, status: SlotStatus) -> Self {
        Self {
            owner,
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), SwapError> {
        if self.title.is_empty() {
            return Err(SwapError::validation("title must not be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(SwapError::validation(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        if self.start >= self.end {
            return Err(SwapError::validation("start must be before end"));
        }
        if !self.status.is_owner_settable() {
            return Err(SwapError::validation(format!(
                "status {} cannot be set directly",
                self.status
            )));
        }
        Ok(())
    }
}

fn normalize_location(location: Option<String>) -> Option<String> {
    location
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}
