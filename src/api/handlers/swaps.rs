//! Swap negotiation handlers: propose, respond, list.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{ProposeSwapRequest, RespondSwapRequest};
use crate::api::identity::Caller;
use crate::app_state::AppState;
use crate::domain::{SwapRequest, SwapRequestId};
use crate::error::{ErrorResponse, SwapError};
use crate::service::SwapRequestLists;

/// `POST /swaps` — Propose exchanging one of the caller's slots for
/// another user's.
///
/// # Errors
///
/// Returns [`SwapError`] if either slot is missing, the caller does not own
/// the offered slot, or either slot is not available for a swap.
#[utoipa::path(
    post,
    path = "/api/v1/swaps",
    tag = "Swaps",
    summary = "Propose a swap",
    description = "Reserves both slots and creates a PENDING request addressed to the owner of the wanted slot.",
    params(
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    request_body = ProposeSwapRequest,
    responses(
        (status = 201, description = "Swap proposed", body = SwapRequest),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Caller does not own the offered slot", body = ErrorResponse),
        (status = 404, description = "Slot not found", body = ErrorResponse),
        (status = 409, description = "A slot is not swappable or already reserved", body = ErrorResponse),
    )
)]
pub async fn propose_swap(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<ProposeSwapRequest>, JsonRejection>,
) -> Result<impl IntoResponse, SwapError> {
    let Json(req) = body?;
    let request = state
        .swap_service
        .propose_swap(caller, req.my_slot_id, req.their_slot_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// `POST /swaps/{id}/respond` — Accept or reject a pending request.
///
/// # Errors
///
/// Returns [`SwapError`] if the request is missing, not addressed to the
/// caller, or already resolved.
#[utoipa::path(
    post,
    path = "/api/v1/swaps/{id}/respond",
    tag = "Swaps",
    summary = "Respond to a swap",
    description = "Accept exchanges the owners of both slots and marks them BUSY; reject returns both to SWAPPABLE.",
    params(
        ("id" = uuid::Uuid, Path, description = "Swap request UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    request_body = RespondSwapRequest,
    responses(
        (status = 200, description = "Request resolved", body = SwapRequest),
        (status = 403, description = "Caller is not the target owner", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
        (status = 409, description = "Request already resolved", body = ErrorResponse),
    )
)]
pub async fn respond_swap(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<SwapRequestId>, PathRejection>,
    body: Result<Json<RespondSwapRequest>, JsonRejection>,
) -> Result<Json<SwapRequest>, SwapError> {
    let Path(id) = path?;
    let Json(req) = body?;
    Ok(Json(
        state
            .swap_service
            .respond_swap(caller, id, req.accept)
            .await?,
    ))
}

/// `GET /swaps` — Incoming pending and all outgoing requests.
///
/// # Errors
///
/// Returns [`SwapError`] on ledger failure.
#[utoipa::path(
    get,
    path = "/api/v1/swaps",
    tag = "Swaps",
    summary = "List swap requests",
    params(
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 200, description = "Incoming and outgoing requests", body = SwapRequestLists),
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<SwapRequestLists>, SwapError> {
    Ok(Json(state.swap_service.list_requests(caller).await?))
}

/// `GET /swaps/{id}` — Fetch one request the caller is party to.
///
/// # Errors
///
/// Returns [`SwapError`] if the request is missing or the caller is
/// neither requester nor target.
#[utoipa::path(
    get,
    path = "/api/v1/swaps/{id}",
    tag = "Swaps",
    summary = "Get a swap request",
    params(
        ("id" = uuid::Uuid, Path, description = "Swap request UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 200, description = "Swap request", body = SwapRequest),
        (status = 403, description = "Caller is not a party", body = ErrorResponse),
        (status = 404, description = "Request not found", body = ErrorResponse),
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<SwapRequestId>, PathRejection>,
) -> Result<Json<SwapRequest>, SwapError> {
    let Path(id) = path?;
    Ok(Json(state.swap_service.get_request(caller, id).await?))
}

/// Swap negotiation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/swaps", post(propose_swap).get(list_requests))
        .route("/swaps/{id}", get(get_request))
        .route("/swaps/{id}/respond", post(respond_swap))
}
