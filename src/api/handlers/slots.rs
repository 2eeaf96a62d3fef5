//! Slot registry handlers: create, list, get, update, delete.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CreateSlotRequest, UpdateSlotRequest};
use crate::api::identity::Caller;
use crate::app_state::AppState;
use crate::domain::{Slot, SlotId};
use crate::error::{ErrorResponse, SwapError};

/// `POST /slots` — Create a slot owned by the caller.
///
/// # Errors
///
/// Returns [`SwapError::Validation`] on invalid fields.
#[utoipa::path(
    post,
    path = "/api/v1/slots",
    tag = "Slots",
    summary = "Create a slot",
    description = "Creates a time slot owned by the caller. The initial status must be BUSY or SWAPPABLE.",
    params(
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    request_body = CreateSlotRequest,
    responses(
        (status = 201, description = "Slot created", body = Slot),
        (status = 400, description = "Invalid slot fields", body = ErrorResponse),
    )
)]
pub async fn create_slot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<CreateSlotRequest>, JsonRejection>,
) -> Result<impl IntoResponse, SwapError> {
    let Json(req) = body?;
    let slot = state.slot_service.create_slot(caller, req.into()).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

/// `GET /slots/mine` — List the caller's slots.
///
/// # Errors
///
/// Returns [`SwapError`] on ledger failure.
#[utoipa::path(
    get,
    path = "/api/v1/slots/mine",
    tag = "Slots",
    summary = "List my slots",
    description = "Returns every slot owned by the caller, in any status, ordered by start time.",
    params(
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 200, description = "Caller's slots", body = Vec<Slot>),
    )
)]
pub async fn list_mine(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Slot>>, SwapError> {
    Ok(Json(state.slot_service.list_mine(caller).await?))
}

/// `GET /slots/swappable` — Browse slots offered by other users.
///
/// # Errors
///
/// Returns [`SwapError`] on ledger failure.
#[utoipa::path(
    get,
    path = "/api/v1/slots/swappable",
    tag = "Slots",
    summary = "List swappable slots",
    description = "Returns SWAPPABLE slots owned by anyone but the caller.",
    params(
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 200, description = "Slots open for exchange", body = Vec<Slot>),
    )
)]
pub async fn list_swappable(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Slot>>, SwapError> {
    Ok(Json(state.slot_service.list_swappable(caller).await?))
}

/// `GET /slots/{id}` — Fetch one slot.
///
/// # Errors
///
/// Returns [`SwapError::SlotNotFound`] if the slot does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/slots/{id}",
    tag = "Slots",
    summary = "Get a slot",
    params(
        ("id" = uuid::Uuid, Path, description = "Slot UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 200, description = "Slot", body = Slot),
        (status = 404, description = "Slot not found", body = ErrorResponse),
    )
)]
pub async fn get_slot(
    State(state): State<AppState>,
    Caller(_caller): Caller,
    path: Result<Path<SlotId>, PathRejection>,
) -> Result<Json<Slot>, SwapError> {
    let Path(id) = path?;
    Ok(Json(state.slot_service.get_slot(id).await?))
}

/// `PATCH /slots/{id}` — Edit the caller's slot.
///
/// # Errors
///
/// Returns [`SwapError`] if the slot is missing, not the caller's,
/// reserved for a swap, or the patch is invalid.
#[utoipa::path(
    patch,
    path = "/api/v1/slots/{id}",
    tag = "Slots",
    summary = "Update a slot",
    description = "Applies a partial update. Status may only be toggled between BUSY and SWAPPABLE, and a slot reserved for a pending swap cannot be edited.",
    params(
        ("id" = uuid::Uuid, Path, description = "Slot UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    request_body = UpdateSlotRequest,
    responses(
        (status = 200, description = "Updated slot", body = Slot),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 403, description = "Caller does not own the slot", body = ErrorResponse),
        (status = 404, description = "Slot not found", body = ErrorResponse),
        (status = 409, description = "Slot is reserved for a swap", body = ErrorResponse),
    )
)]
pub async fn update_slot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<SlotId>, PathRejection>,
    body: Result<Json<UpdateSlotRequest>, JsonRejection>,
) -> Result<Json<Slot>, SwapError> {
    let Path(id) = path?;
    let Json(req) = body?;
    Ok(Json(
        state.slot_service.update_slot(caller, id, req.into()).await?,
    ))
}

/// `DELETE /slots/{id}` — Remove the caller's slot.
///
/// # Errors
///
/// Returns [`SwapError`] if the slot is missing, not the caller's, or
/// reserved for a swap.
#[utoipa::path(
    delete,
    path = "/api/v1/slots/{id}",
    tag = "Slots",
    summary = "Delete a slot",
    params(
        ("id" = uuid::Uuid, Path, description = "Slot UUID"),
        ("x-user-id" = uuid::Uuid, Header, description = "Caller id"),
    ),
    responses(
        (status = 204, description = "Slot deleted"),
        (status = 403, description = "Caller does not own the slot", body = ErrorResponse),
        (status = 404, description = "Slot not found", body = ErrorResponse),
        (status = 409, description = "Slot is reserved for a swap", body = ErrorResponse),
    )
)]
pub async fn delete_slot(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<SlotId>, PathRejection>,
) -> Result<impl IntoResponse, SwapError> {
    let Path(id) = path?;
    state.slot_service.delete_slot(caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Slot registry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/slots", post(create_slot))
        .route("/slots/mine", get(list_mine))
        .route("/slots/swappable", get(list_swappable))
        .route(
            "/slots/{id}",
            get(get_slot).patch(update_slot).delete(delete_slot),
        )
}
