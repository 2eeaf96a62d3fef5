//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{slots, swaps, system};

/// Aggregated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "slotswap",
        description = "Two-party time-slot swap negotiation. Every /api/v1 call identifies the caller through the x-user-id header."
    ),
    paths(
        system::health_handler,
        slots::create_slot,
        slots::list_mine,
        slots::list_swappable,
        slots::get_slot,
        slots::update_slot,
        slots::delete_slot,
        swaps::propose_swap,
        swaps::respond_swap,
        swaps::list_requests,
        swaps::get_request,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Slots", description = "Slot registry"),
        (name = "Swaps", description = "Swap negotiation"),
    )
)]
pub struct ApiDoc;
