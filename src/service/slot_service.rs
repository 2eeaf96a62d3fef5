//! Slot registry: owner-facing slot CRUD with status guards.

use std::sync::Arc;

use crate::domain::{NewSlot, Slot, SlotId, SlotPatch, SlotStatus, UserId};
use crate::error::SwapError;
use crate::ledger::{Ledger, Mutation, ReadSet, SlotFilter, Snapshot, plan};

/// Registry of slots.
///
/// Each write is a single-row ledger transaction whose guard is the status
/// read in the same unit, so an owner edit can never overwrite a
/// reservation placed concurrently by the swap engine.
#[derive(Debug, Clone)]
pub struct SlotService {
    ledger: Arc<dyn Ledger>,
}

impl SlotService {
    /// Creates a new `SlotService`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Creates a slot owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Validation`] for invalid fields or an initial
    /// status other than `BUSY`/`SWAPPABLE`.
    pub async fn create_slot(&self, owner: UserId, fields: NewSlot) -> Result<Slot, SwapError> {
        let slot = Slot::create(owner, fields)?;
        let row = slot.clone();
        self.ledger
            .transact(
                ReadSet::default(),
                &plan(move |_| Ok(vec![Mutation::InsertSlot(row.clone())])),
            )
            .await?;

        tracing::info!(slot_id = %slot.id, %owner, status = %slot.status, "slot created");
        Ok(slot)
    }

    /// Returns a single slot.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::SlotNotFound`] if it does not exist.
    pub async fn get_slot(&self, id: SlotId) -> Result<Slot, SwapError> {
        self.ledger
            .get_slot(id)
            .await?
            .ok_or(SwapError::SlotNotFound(id))
    }

    /// Applies `patch` to a slot owned by `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::SlotNotFound`], [`SwapError::Forbidden`] for a
    /// non-owner, [`SwapError::Conflict`] while the slot is reserved for a
    /// swap, or [`SwapError::Validation`] for an empty or invalid patch.
    pub async fn update_slot(
        &self,
        caller: UserId,
        id: SlotId,
        patch: SlotPatch,
    ) -> Result<Slot, SwapError> {
        if patch.is_empty() {
            return Err(SwapError::validation("update must change at least one field"));
        }

        let applied = self
            .ledger
            .transact(
                ReadSet::slots([id]),
                &plan(move |snap| plan_update(snap, caller, id, &patch)),
            )
            .await?;

        let slot = applied
            .iter()
            .find_map(Mutation::as_slot)
            .cloned()
            .ok_or_else(|| SwapError::Internal("update committed without a slot row".into()))?;

        tracing::info!(slot_id = %id, status = %slot.status, "slot updated");
        Ok(slot)
    }

    /// Deletes a slot owned by `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::SlotNotFound`], [`SwapError::Forbidden`] for a
    /// non-owner, or [`SwapError::Conflict`] while the slot is reserved.
    pub async fn delete_slot(&self, caller: UserId, id: SlotId) -> Result<(), SwapError> {
        self.ledger
            .transact(
                ReadSet::slots([id]),
                &plan(move |snap| {
                    let slot = owned_slot(snap, caller, id)?;
                    ensure_not_reserved(slot)?;
                    Ok(vec![Mutation::DeleteSlot {
                        id,
                        expected_status: slot.status,
                    }])
                }),
            )
            .await?;

        tracing::info!(slot_id = %id, "slot deleted");
        Ok(())
    }

    /// Lists every slot owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on ledger failure.
    pub async fn list_mine(&self, owner: UserId) -> Result<Vec<Slot>, SwapError> {
        self.ledger.list_slots(SlotFilter::OwnedBy(owner)).await
    }

    /// Lists swappable slots not owned by `caller`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on ledger failure.
    pub async fn list_swappable(&self, caller: UserId) -> Result<Vec<Slot>, SwapError> {
        self.ledger.list_slots(SlotFilter::SwappableExcept(caller)).await
    }
}

fn plan_update(
    snap: &Snapshot,
    caller: UserId,
    id: SlotId,
    patch: &SlotPatch,
) -> Result<Vec<Mutation>, SwapError> {
    let current = owned_slot(snap, caller, id)?;
    ensure_not_reserved(current)?;
    let next = current.patched(patch)?;
    Ok(vec![Mutation::ReplaceSlot {
        slot: next,
        expected_status: current.status,
    }])
}

fn owned_slot(snap: &Snapshot, caller: UserId, id: SlotId) -> Result<&Slot, SwapError> {
    let slot = snap.slot(id).ok_or(SwapError::SlotNotFound(id))?;
    if slot.owner != caller {
        return Err(SwapError::forbidden(format!("slot {id} is not owned by the caller")));
    }
    Ok(slot)
}

fn ensure_not_reserved(slot: &Slot) -> Result<(), SwapError> {
    if slot.status == SlotStatus::ReservedForSwap {
        return Err(SwapError::conflict(format!(
            "slot {} is reserved for a pending swap",
            slot.id
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use chrono::{Duration, Utc};

    fn make_service() -> SlotService {
        SlotService::new(Arc::new(MemoryLedger::new()))
    }

    fn fields(status: SlotStatus) -> NewSlot {
        let start = Utc::now() + Duration::days(1);
        NewSlot {
            title: "Tuesday late shift".to_string(),
            start,
            end: start + Duration::hours(8),
            location: Some("Dock 4".to_string()),
            status,
        }
    }

    async fn create(service: &SlotService, owner: UserId, status: SlotStatus) -> Slot {
        let Ok(slot) = service.create_slot(owner, fields(status)).await else {
            panic!("slot creation failed");
        };
        slot
    }

    #[tokio::test]
    async fn create_then_get() {
        let service = make_service();
        let owner = UserId::new();
        let slot = create(&service, owner, SlotStatus::Busy).await;

        let Ok(fetched) = service.get_slot(slot.id).await else {
            panic!("slot not found");
        };
        assert_eq!(fetched, slot);
        assert_eq!(fetched.owner, owner);
    }

    #[tokio::test]
    async fn create_rejects_reserved_status() {
        let service = make_service();
        let result = service
            .create_slot(UserId::new(), fields(SlotStatus::ReservedForSwap))
            .await;
        assert!(matches!(result, Err(SwapError::Validation(_))));
    }

    #[tokio::test]
    async fn owner_toggles_busy_and_swappable() {
        let service = make_service();
        let owner = UserId::new();
        let slot = create(&service, owner, SlotStatus::Busy).await;

        let patch = SlotPatch {
            status: Some(SlotStatus::Swappable),
            ..SlotPatch::default()
        };
        let Ok(updated) = service.update_slot(owner, slot.id, patch).await else {
            panic!("toggle failed");
        };
        assert_eq!(updated.status, SlotStatus::Swappable);

        let patch = SlotPatch {
            status: Some(SlotStatus::Busy),
            ..SlotPatch::default()
        };
        let Ok(updated) = service.update_slot(owner, slot.id, patch).await else {
            panic!("toggle failed");
        };
        assert_eq!(updated.status, SlotStatus::Busy);
    }

    #[tokio::test]
    async fn non_owner_cannot_update_or_delete() {
        let service = make_service();
        let slot = create(&service, UserId::new(), SlotStatus::Busy).await;
        let intruder = UserId::new();

        let patch = SlotPatch {
            title: Some("mine now".to_string()),
            ..SlotPatch::default()
        };
        assert!(matches!(
            service.update_slot(intruder, slot.id, patch).await,
            Err(SwapError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_slot(intruder, slot.id).await,
            Err(SwapError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn empty_patch_is_validation_error() {
        let service = make_service();
        let owner = UserId::new();
        let slot = create(&service, owner, SlotStatus::Busy).await;
        let result = service
            .update_slot(owner, slot.id, SlotPatch::default())
            .await;
        assert!(matches!(result, Err(SwapError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_removes_slot() {
        let service = make_service();
        let owner = UserId::new();
        let slot = create(&service, owner, SlotStatus::Swappable).await;

        assert!(service.delete_slot(owner, slot.id).await.is_ok());
        assert!(matches!(
            service.get_slot(slot.id).await,
            Err(SwapError::SlotNotFound(_))
        ));
        assert!(matches!(
            service.delete_slot(owner, slot.id).await,
            Err(SwapError::SlotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn listings_respect_owner_and_status() {
        let service = make_service();
        let (me, other) = (UserId::new(), UserId::new());
        create(&service, me, SlotStatus::Swappable).await;
        create(&service, other, SlotStatus::Swappable).await;
        create(&service, other, SlotStatus::Busy).await;

        let Ok(mine) = service.list_mine(me).await else {
            panic!("list_mine failed");
        };
        assert_eq!(mine.len(), 1);

        let Ok(swappable) = service.list_swappable(me).await else {
            panic!("list_swappable failed");
        };
        assert_eq!(swappable.len(), 1);
        assert!(
            swappable
                .iter()
                .all(|s| s.owner == other && s.status == SlotStatus::Swappable)
        );
    }
}
