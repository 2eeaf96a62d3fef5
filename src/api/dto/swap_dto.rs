//! Swap negotiation DTOs.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::SlotId;

/// Request body for `POST /swaps`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProposeSwapRequest {
    /// Slot the caller offers; must be theirs and `SWAPPABLE`.
    pub my_slot_id: SlotId,
    /// Slot the caller wants; must be someone else's and `SWAPPABLE`.
    pub their_slot_id: SlotId,
}

/// Request body for `POST /swaps/{id}/respond`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondSwapRequest {
    /// `true` exchanges the slots, `false` releases them.
    pub accept: bool,
}
