//! Swap negotiation engine: reserve on propose, finalize on respond.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{
    NotificationSink, Slot, SlotId, SlotStatus, SwapEvent, SwapRequest, SwapRequestId,
    SwapStatus, UserId,
};
use crate::error::SwapError;
use crate::ledger::{Ledger, Mutation, ReadSet, RequestFilter, Snapshot, plan};

/// A user's view of swap requests.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SwapRequestLists {
    /// Pending requests addressed to the user.
    pub incoming: Vec<SwapRequest>,
    /// Every request the user proposed, in any status.
    pub outgoing: Vec<SwapRequest>,
}

/// Orchestration layer for the two-phase swap protocol.
///
/// Stateless coordinator: owns a handle to the [`Ledger`] for state and a
/// [`NotificationSink`] for event emission. Every mutation follows the
/// pattern: lock read set → re-check preconditions → commit guarded writes →
/// notify after commit → return result.
#[derive(Debug, Clone)]
pub struct SwapService {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationSink>,
}

impl SwapService {
    /// Creates a new `SwapService`.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { ledger, notifier }
    }

    /// Proposes exchanging `my_slot` (owned by `requester`) for
    /// `their_slot`, reserving both.
    ///
    /// # Errors
    ///
    /// - [`SwapError::Validation`] if both ids name the same slot.
    /// - [`SwapError::SlotNotFound`] if either slot does not exist.
    /// - [`SwapError::Forbidden`] if `requester` does not own `my_slot`.
    /// - [`SwapError::Conflict`] if `requester` also owns `their_slot`, or
    ///   either slot is not swappable or already reserved.
    /// - [`SwapError::InvariantViolation`] if the ledger holds a reservation
    ///   without its pending request, or vice versa.
    pub async fn propose_swap(
        &self,
        requester: UserId,
        my_slot: SlotId,
        their_slot: SlotId,
    ) -> Result<SwapRequest, SwapError> {
        if my_slot == their_slot {
            return Err(SwapError::validation("cannot swap a slot with itself"));
        }

        let applied = self
            .ledger
            .transact(
                ReadSet::slots([my_slot, their_slot]),
                &plan(move |snap| plan_proposal(snap, requester, my_slot, their_slot)),
            )
            .await?;
        let request = committed_request(&applied)?;

        tracing::info!(
            request_id = %request.id,
            %requester,
            target_owner = %request.target_owner,
            %my_slot,
            %their_slot,
            "swap proposed"
        );

        self.notify(
            request.target_owner,
            SwapEvent::NewSwapRequest {
                request: request.clone(),
                timestamp: Utc::now(),
            },
        );
        Ok(request)
    }

    /// Accepts or rejects a pending request addressed to `responder`.
    ///
    /// On accept, the owners of both slots are exchanged and both become
    /// `BUSY`; on reject, both return to `SWAPPABLE` with owners unchanged.
    ///
    /// # Errors
    ///
    /// - [`SwapError::RequestNotFound`] if the request does not exist.
    /// - [`SwapError::Forbidden`] if `responder` is not the target owner.
    /// - [`SwapError::Conflict`] if the request is no longer pending.
    /// - [`SwapError::InvariantViolation`] if a referenced slot is missing or
    ///   not reserved.
    pub async fn respond_swap(
        &self,
        responder: UserId,
        request_id: SwapRequestId,
        accept: bool,
    ) -> Result<SwapRequest, SwapError> {
        let applied = self
            .ledger
            .transact(
                ReadSet::request(request_id),
                &plan(move |snap| plan_response(snap, responder, request_id, accept)),
            )
            .await?;
        let request = committed_request(&applied)?;

        tracing::info!(
            %request_id,
            %responder,
            status = %request.status,
            "swap resolved"
        );

        self.notify(
            request.requester,
            SwapEvent::SwapResponse {
                request: request.clone(),
                accepted: accept,
                timestamp: Utc::now(),
            },
        );
        self.notify(
            request.target_owner,
            SwapEvent::SwapResolved {
                request: request.clone(),
                accepted: accept,
                timestamp: Utc::now(),
            },
        );
        Ok(request)
    }

    /// Returns pending requests addressed to `user` and every request
    /// `user` proposed.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on ledger failure.
    pub async fn list_requests(&self, user: UserId) -> Result<SwapRequestLists, SwapError> {
        let (incoming, outgoing) = tokio::try_join!(
            self.ledger.list_requests(RequestFilter::IncomingPending(user)),
            self.ledger.list_requests(RequestFilter::OutgoingAll(user)),
        )?;
        Ok(SwapRequestLists { incoming, outgoing })
    }

    /// Returns a single request visible to `user` (either party).
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::RequestNotFound`] if it does not exist, or
    /// [`SwapError::Forbidden`] if `user` is not a party to it.
    pub async fn get_request(
        &self,
        user: UserId,
        id: SwapRequestId,
    ) -> Result<SwapRequest, SwapError> {
        let request = self
            .ledger
            .get_request(id)
            .await?
            .ok_or(SwapError::RequestNotFound(id))?;
        if request.requester != user && request.target_owner != user {
            return Err(SwapError::forbidden(format!(
                "caller is not a party to swap request {id}"
            )));
        }
        Ok(request)
    }

    fn notify(&self, target: UserId, event: SwapEvent) {
        let name = event.event_name();
        if let Err(e) = self.notifier.push(target, event) {
            tracing::warn!(%target, event = name, error = %e, "notification dropped");
        }
    }
}

fn plan_proposal(
    snap: &Snapshot,
    requester: UserId,
    my_slot: SlotId,
    their_slot: SlotId,
) -> Result<Vec<Mutation>, SwapError> {
    let mine = snap.slot(my_slot).ok_or(SwapError::SlotNotFound(my_slot))?;
    let theirs = snap
        .slot(their_slot)
        .ok_or(SwapError::SlotNotFound(their_slot))?;

    if mine.owner != requester {
        return Err(SwapError::forbidden(format!(
            "slot {my_slot} is not owned by the caller"
        )));
    }
    if theirs.owner == requester {
        return Err(SwapError::conflict(format!(
            "slot {their_slot} is already owned by the caller"
        )));
    }
    ensure_reservable(snap, mine)?;
    ensure_reservable(snap, theirs)?;

    Ok(vec![
        Mutation::ReplaceSlot {
            slot: mine.transitioned(mine.owner, SlotStatus::ReservedForSwap),
            expected_status: SlotStatus::Swappable,
        },
        Mutation::ReplaceSlot {
            slot: theirs.transitioned(theirs.owner, SlotStatus::ReservedForSwap),
            expected_status: SlotStatus::Swappable,
        },
        Mutation::InsertRequest(SwapRequest::pending(mine, theirs)),
    ])
}

fn plan_response(
    snap: &Snapshot,
    responder: UserId,
    request_id: SwapRequestId,
    accept: bool,
) -> Result<Vec<Mutation>, SwapError> {
    let request = snap
        .request(request_id)
        .ok_or(SwapError::RequestNotFound(request_id))?;

    if request.target_owner != responder {
        return Err(SwapError::forbidden(format!(
            "swap request {request_id} is not addressed to the caller"
        )));
    }
    if request.status != SwapStatus::Pending {
        return Err(SwapError::conflict(format!(
            "swap request {request_id} is already {}",
            request.status
        )));
    }

    let offered = held_slot(snap, request, request.requester_slot, request.requester)?;
    let wanted = held_slot(snap, request, request.target_slot, request.target_owner)?;

    let (offered_next, wanted_next) = if accept {
        (
            offered.transitioned(wanted.owner, SlotStatus::Busy),
            wanted.transitioned(offered.owner, SlotStatus::Busy),
        )
    } else {
        (
            offered.transitioned(offered.owner, SlotStatus::Swappable),
            wanted.transitioned(wanted.owner, SlotStatus::Swappable),
        )
    };

    Ok(vec![
        Mutation::ReplaceSlot {
            slot: offered_next,
            expected_status: SlotStatus::ReservedForSwap,
        },
        Mutation::ReplaceSlot {
            slot: wanted_next,
            expected_status: SlotStatus::ReservedForSwap,
        },
        Mutation::ReplaceRequest {
            request: request.resolved(accept),
            expected_status: SwapStatus::Pending,
        },
    ])
}

/// Checks that `slot` is swappable and free of any pending request.
fn ensure_reservable(snap: &Snapshot, slot: &Slot) -> Result<(), SwapError> {
    let holders = snap.pending_for(slot.id).count();
    match (slot.status, holders) {
        (SlotStatus::ReservedForSwap, 1) => Err(SwapError::conflict(format!(
            "slot {} is already reserved for another swap",
            slot.id
        ))),
        (SlotStatus::Swappable, 0) => Ok(()),
        (SlotStatus::Busy, 0) => Err(SwapError::conflict(format!(
            "slot {} is not swappable",
            slot.id
        ))),
        (status, n) => Err(SwapError::invariant(format!(
            "slot {} is {status} with {n} pending request(s)",
            slot.id
        ))),
    }
}

/// Returns a slot referenced by a pending request, checking the reservation
/// is intact and held by exactly that request.
fn held_slot<'a>(
    snap: &'a Snapshot,
    request: &SwapRequest,
    id: SlotId,
    expected_owner: UserId,
) -> Result<&'a Slot, SwapError> {
    let slot = snap.slot(id).ok_or_else(|| {
        SwapError::invariant(format!("slot {id} of pending request {} is missing", request.id))
    })?;
    if slot.status != SlotStatus::ReservedForSwap || slot.owner != expected_owner {
        return Err(SwapError::invariant(format!(
            "slot {id} of pending request {} is {} and owned by {}",
            request.id, slot.status, slot.owner
        )));
    }
    if snap.pending_for(id).any(|r| r.id != request.id) {
        return Err(SwapError::invariant(format!(
            "slot {id} is referenced by more than one pending request"
        )));
    }
    Ok(slot)
}

fn committed_request(applied: &[Mutation]) -> Result<SwapRequest, SwapError> {
    applied
        .iter()
        .find_map(Mutation::as_request)
        .cloned()
        .ok_or_else(|| SwapError::Internal("swap committed without a request row".into()))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventBus, NewSlot, NotifyError, SlotPatch};
    use crate::ledger::MemoryLedger;
    use crate::service::SlotService;
    use chrono::Duration;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Default)]
    struct RecordingSink {
        events: Mutex<Vec<(UserId, &'static str)>>,
    }

    impl RecordingSink {
        fn names_for(&self, user: UserId) -> Vec<&'static str> {
            self.events
                .lock()
                .map(|e| {
                    e.iter()
                        .filter(|(u, _)| *u == user)
                        .map(|(_, n)| *n)
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    impl NotificationSink for RecordingSink {
        fn push(&self, target: UserId, event: SwapEvent) -> Result<(), NotifyError> {
            if let Ok(mut events) = self.events.lock() {
                events.push((target, event.event_name()));
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn push(&self, _: UserId, _: SwapEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Closed)
        }
    }

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        slots: SlotService,
        swaps: SwapService,
        sink: Arc<RecordingSink>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MemoryLedger::new());
        let sink = Arc::new(RecordingSink::default());
        Fixture {
            slots: SlotService::new(Arc::clone(&ledger) as Arc<dyn Ledger>),
            swaps: SwapService::new(
                Arc::clone(&ledger) as Arc<dyn Ledger>,
                Arc::clone(&sink) as Arc<dyn NotificationSink>,
            ),
            ledger,
            sink,
        }
    }

    impl Fixture {
        async fn slot(&self, owner: UserId, status: SlotStatus) -> Slot {
            let start = Utc::now() + Duration::days(2);
            let Ok(slot) = self
                .slots
                .create_slot(
                    owner,
                    NewSlot {
                        title: "on-call".to_string(),
                        start,
                        end: start + Duration::hours(12),
                        location: None,
                        status,
                    },
                )
                .await
            else {
                panic!("slot creation failed");
            };
            slot
        }

        async fn status(&self, id: SlotId) -> (UserId, SlotStatus) {
            let Ok(slot) = self.slots.get_slot(id).await else {
                panic!("slot {id} missing");
            };
            (slot.owner, slot.status)
        }

        async fn assert_invariants(&self) {
            assert_ok!(self.ledger.verify_invariants().await);
        }
    }

    /// Builds a valid `SWAPPABLE` slot without storing it.
    fn detached_slot(owner: UserId) -> Slot {
        let start = Utc::now() + Duration::days(3);
        let Ok(slot) = Slot::create(
            owner,
            NewSlot {
                title: "night watch".to_string(),
                start,
                end: start + Duration::hours(6),
                location: None,
                status: SlotStatus::Swappable,
            },
        ) else {
            panic!("slot construction failed");
        };
        slot
    }

    /// Writes rows straight into the ledger, bypassing the engine's checks.
    async fn seed(ledger: &MemoryLedger, rows: Vec<Mutation>) {
        assert_ok!(
            ledger
                .transact(ReadSet::default(), &plan(move |_| Ok(rows.clone())))
                .await
        );
    }

    #[tokio::test]
    async fn reserved_slot_without_request_is_invariant_violation() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let orphan = detached_slot(b).transitioned(b, SlotStatus::ReservedForSwap);
        seed(&fx.ledger, vec![Mutation::InsertSlot(orphan.clone())]).await;

        let result = fx.swaps.propose_swap(a, s1.id, orphan.id).await;
        assert!(matches!(result, Err(SwapError::InvariantViolation(_))));

        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::Swappable));
        assert_eq!(fx.status(orphan.id).await, (b, SlotStatus::ReservedForSwap));
        let lists = assert_ok!(fx.swaps.list_requests(a).await);
        assert!(lists.outgoing.is_empty());
        assert!(fx.sink.names_for(b).is_empty());
    }

    #[tokio::test]
    async fn pending_request_on_unreserved_slot_is_invariant_violation() {
        let fx = fixture();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let s3 = fx.slot(c, SlotStatus::Swappable).await;
        let stray = SwapRequest::pending(&s1, &s2);
        seed(&fx.ledger, vec![Mutation::InsertRequest(stray.clone())]).await;

        let proposal = fx.swaps.propose_swap(c, s3.id, s2.id).await;
        assert!(matches!(proposal, Err(SwapError::InvariantViolation(_))));
        assert_eq!(fx.status(s3.id).await, (c, SlotStatus::Swappable));

        let response = fx.swaps.respond_swap(b, stray.id, true).await;
        assert!(matches!(response, Err(SwapError::InvariantViolation(_))));
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::Swappable));
        assert_eq!(fx.status(s2.id).await, (b, SlotStatus::Swappable));
        let stored = assert_ok!(fx.swaps.get_request(b, stray.id).await);
        assert_eq!(stored.status, SwapStatus::Pending);
    }

    #[tokio::test]
    async fn respond_with_missing_slot_is_invariant_violation() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let offered = detached_slot(a).transitioned(a, SlotStatus::ReservedForSwap);
        let ghost = detached_slot(b).transitioned(b, SlotStatus::ReservedForSwap);
        let request = SwapRequest::pending(&offered, &ghost);
        seed(
            &fx.ledger,
            vec![
                Mutation::InsertSlot(offered.clone()),
                Mutation::InsertRequest(request.clone()),
            ],
        )
        .await;

        let result = fx.swaps.respond_swap(b, request.id, true).await;
        assert!(matches!(result, Err(SwapError::InvariantViolation(_))));

        assert_eq!(fx.status(offered.id).await, (a, SlotStatus::ReservedForSwap));
        let stored = assert_ok!(fx.swaps.get_request(a, request.id).await);
        assert_eq!(stored.status, SwapStatus::Pending);
        assert!(fx.sink.names_for(a).is_empty());
    }

    #[tokio::test]
    async fn propose_reserves_both_slots() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;

        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);
        assert_eq!(request.status, SwapStatus::Pending);
        assert_eq!(request.requester, a);
        assert_eq!(request.target_owner, b);
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::ReservedForSwap));
        assert_eq!(fx.status(s2.id).await, (b, SlotStatus::ReservedForSwap));
        assert_eq!(fx.sink.names_for(b), vec!["newSwapRequest"]);
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn accept_exchanges_owners_and_marks_busy() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        let resolved = assert_ok!(fx.swaps.respond_swap(b, request.id, true).await);
        assert_eq!(resolved.status, SwapStatus::Accepted);
        assert!(resolved.resolved_at.is_some());
        assert_eq!(fx.status(s1.id).await, (b, SlotStatus::Busy));
        assert_eq!(fx.status(s2.id).await, (a, SlotStatus::Busy));
        assert_eq!(fx.sink.names_for(a), vec!["swapResponse"]);
        assert_eq!(fx.sink.names_for(b), vec!["newSwapRequest", "swapResolved"]);
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn reject_releases_both_slots() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        let resolved = assert_ok!(fx.swaps.respond_swap(b, request.id, false).await);
        assert_eq!(resolved.status, SwapStatus::Rejected);
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::Swappable));
        assert_eq!(fx.status(s2.id).await, (b, SlotStatus::Swappable));
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn second_response_conflicts_without_mutation() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);
        assert_ok!(fx.swaps.respond_swap(b, request.id, true).await);

        let again = fx.swaps.respond_swap(b, request.id, false).await;
        assert!(matches!(again, Err(SwapError::Conflict(_))));
        assert_eq!(fx.status(s1.id).await, (b, SlotStatus::Busy));
        assert_eq!(fx.status(s2.id).await, (a, SlotStatus::Busy));
        let stored = assert_ok!(fx.swaps.get_request(a, request.id).await);
        assert_eq!(stored.status, SwapStatus::Accepted);
    }

    #[tokio::test]
    async fn only_target_owner_may_respond() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        for outsider in [a, UserId::new()] {
            let result = fx.swaps.respond_swap(outsider, request.id, true).await;
            assert!(matches!(result, Err(SwapError::Forbidden(_))));
        }
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::ReservedForSwap));
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn respond_to_unknown_request_is_not_found() {
        let fx = fixture();
        let result = fx
            .swaps
            .respond_swap(UserId::new(), SwapRequestId::new(), true)
            .await;
        assert!(matches!(result, Err(SwapError::RequestNotFound(_))));
    }

    #[tokio::test]
    async fn same_owner_swap_is_rejected() {
        let fx = fixture();
        let a = UserId::new();
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s1_again = fx.slot(a, SlotStatus::Swappable).await;

        let result = fx.swaps.propose_swap(a, s1.id, s1_again.id).await;
        assert!(matches!(result, Err(SwapError::Conflict(_))));
        let itself = fx.swaps.propose_swap(a, s1.id, s1.id).await;
        assert!(matches!(itself, Err(SwapError::Validation(_))));
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::Swappable));
        assert_eq!(fx.status(s1_again.id).await, (a, SlotStatus::Swappable));
    }

    #[tokio::test]
    async fn busy_target_conflicts() {
        let fx = fixture();
        let (a, c) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s3 = fx.slot(c, SlotStatus::Busy).await;

        let result = fx.swaps.propose_swap(a, s1.id, s3.id).await;
        assert!(matches!(result, Err(SwapError::Conflict(_))));
        assert_eq!(fx.status(s1.id).await, (a, SlotStatus::Swappable));
        assert_eq!(fx.status(s3.id).await, (c, SlotStatus::Busy));
        assert!(fx.sink.names_for(c).is_empty());
    }

    #[tokio::test]
    async fn offering_someone_elses_slot_is_forbidden() {
        let fx = fixture();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let sb = fx.slot(b, SlotStatus::Swappable).await;
        let sc = fx.slot(c, SlotStatus::Swappable).await;

        let result = fx.swaps.propose_swap(a, sb.id, sc.id).await;
        assert!(matches!(result, Err(SwapError::Forbidden(_))));
    }

    #[tokio::test]
    async fn missing_slot_is_not_found() {
        let fx = fixture();
        let a = UserId::new();
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let result = fx.swaps.propose_swap(a, s1.id, SlotId::new()).await;
        assert!(matches!(result, Err(SwapError::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn reserved_slot_cannot_be_proposed_again() {
        let fx = fixture();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let s3 = fx.slot(c, SlotStatus::Swappable).await;
        assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        let result = fx.swaps.propose_swap(c, s3.id, s2.id).await;
        assert!(matches!(result, Err(SwapError::Conflict(_))));
        assert_eq!(fx.status(s3.id).await, (c, SlotStatus::Swappable));
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn reserved_slot_rejects_owner_edits() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        let patch = SlotPatch {
            status: Some(SlotStatus::Busy),
            ..SlotPatch::default()
        };
        let update = fx.slots.update_slot(a, s1.id, patch).await;
        assert!(matches!(update, Err(SwapError::Conflict(_))));
        let delete = fx.slots.delete_slot(b, s2.id).await;
        assert!(matches!(delete, Err(SwapError::Conflict(_))));
        fx.assert_invariants().await;
    }

    #[tokio::test]
    async fn list_requests_splits_incoming_and_outgoing() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let s3 = fx.slot(a, SlotStatus::Swappable).await;
        let s4 = fx.slot(b, SlotStatus::Swappable).await;

        let first = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);
        assert_ok!(fx.swaps.respond_swap(b, first.id, false).await);
        let second = assert_ok!(fx.swaps.propose_swap(a, s3.id, s4.id).await);

        let for_b = assert_ok!(fx.swaps.list_requests(b).await);
        assert_eq!(for_b.incoming.len(), 1);
        assert_eq!(for_b.incoming.first().map(|r| r.id), Some(second.id));
        assert!(for_b.outgoing.is_empty());

        let for_a = assert_ok!(fx.swaps.list_requests(a).await);
        assert!(for_a.incoming.is_empty());
        assert_eq!(for_a.outgoing.len(), 2);
    }

    #[tokio::test]
    async fn get_request_hidden_from_third_parties() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        assert_ok!(fx.swaps.get_request(b, request.id).await);
        assert_err!(fx.swaps.get_request(UserId::new(), request.id).await);
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_operation() {
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        let slots = SlotService::new(Arc::clone(&ledger));
        let swaps = SwapService::new(Arc::clone(&ledger), Arc::new(FailingSink));
        let (a, b) = (UserId::new(), UserId::new());
        let start = Utc::now();
        let fields = || NewSlot {
            title: "x".to_string(),
            start,
            end: start + Duration::hours(1),
            location: None,
            status: SlotStatus::Swappable,
        };
        let s1 = assert_ok!(slots.create_slot(a, fields()).await);
        let s2 = assert_ok!(slots.create_slot(b, fields()).await);

        let request = assert_ok!(swaps.propose_swap(a, s1.id, s2.id).await);
        let resolved = assert_ok!(swaps.respond_swap(b, request.id, true).await);
        assert_eq!(resolved.status, SwapStatus::Accepted);
    }

    #[tokio::test]
    async fn event_bus_delivers_to_target() {
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let slots = SlotService::new(Arc::clone(&ledger));
        let swaps = SwapService::new(Arc::clone(&ledger), Arc::new(bus));
        let (a, b) = (UserId::new(), UserId::new());
        let start = Utc::now();
        let fields = || NewSlot {
            title: "y".to_string(),
            start,
            end: start + Duration::hours(1),
            location: None,
            status: SlotStatus::Swappable,
        };
        let s1 = assert_ok!(slots.create_slot(a, fields()).await);
        let s2 = assert_ok!(slots.create_slot(b, fields()).await);
        let request = assert_ok!(swaps.propose_swap(a, s1.id, s2.id).await);

        let Ok(note) = rx.recv().await else {
            panic!("no notification");
        };
        assert_eq!(note.target, b);
        assert_eq!(note.event.request().id, request.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_proposals_on_one_slot_reserve_once() {
        let fx = fixture();
        let target_owner = UserId::new();
        let contested = fx.slot(target_owner, SlotStatus::Swappable).await;

        let mut proposers = Vec::new();
        for _ in 0..16 {
            let user = UserId::new();
            let offered = fx.slot(user, SlotStatus::Swappable).await;
            proposers.push((user, offered.id));
        }

        let handles: Vec<_> = proposers
            .iter()
            .map(|&(user, offered)| {
                let swaps = fx.swaps.clone();
                let target = contested.id;
                tokio::spawn(async move { swaps.propose_swap(user, offered, target).await })
            })
            .collect();

        let mut won = 0;
        let mut conflicted = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => won += 1,
                Ok(Err(SwapError::Conflict(_))) => conflicted += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(conflicted, 15);

        let mut reserved = 0;
        for (_, offered) in &proposers {
            if fx.status(*offered).await.1 == SlotStatus::ReservedForSwap {
                reserved += 1;
            }
        }
        assert_eq!(reserved, 1);
        fx.assert_invariants().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_responses_resolve_once() {
        let fx = fixture();
        let (a, b) = (UserId::new(), UserId::new());
        let s1 = fx.slot(a, SlotStatus::Swappable).await;
        let s2 = fx.slot(b, SlotStatus::Swappable).await;
        let request = assert_ok!(fx.swaps.propose_swap(a, s1.id, s2.id).await);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let swaps = fx.swaps.clone();
                let id = request.id;
                tokio::spawn(async move { swaps.respond_swap(b, id, i % 2 == 0).await })
            })
            .collect();

        let mut resolved = Vec::new();
        let mut conflicted = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(r)) => resolved.push(r),
                Ok(Err(SwapError::Conflict(_))) => conflicted += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(resolved.len(), 1);
        assert_eq!(conflicted, 7);

        let Some(winner) = resolved.first() else {
            panic!("no winner");
        };
        let expected = if winner.status == SwapStatus::Accepted {
            ((b, SlotStatus::Busy), (a, SlotStatus::Busy))
        } else {
            ((a, SlotStatus::Swappable), (b, SlotStatus::Swappable))
        };
        assert_eq!((fx.status(s1.id).await, fx.status(s2.id).await), expected);
        fx.assert_invariants().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_proposals_never_double_reserve() {
        let fx = fixture();
        let users: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();
        let mut slots = Vec::new();
        for user in &users {
            slots.push(fx.slot(*user, SlotStatus::Swappable).await);
        }

        let mut handles = Vec::new();
        for (i, mine) in slots.iter().enumerate() {
            for (j, theirs) in slots.iter().enumerate() {
                if i == j {
                    continue;
                }
                let swaps = fx.swaps.clone();
                let (owner, my_id, their_id) = (mine.owner, mine.id, theirs.id);
                handles.push(tokio::spawn(async move {
                    swaps.propose_swap(owner, my_id, their_id).await
                }));
            }
        }

        let mut won = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => won += 1,
                Ok(Err(SwapError::Conflict(_))) => {}
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert!(won >= 1);
        assert!(won <= slots.len() / 2);
        fx.assert_invariants().await;
    }
}
