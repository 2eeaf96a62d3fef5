//! In-memory ledger backed by a single lock over arena-style row maps.
//!
//! [`MemoryLedger`] keeps slots and requests in `HashMap`s keyed by id, plus
//! a `pending_by_slot` index mapping each reserved slot to the one pending
//! request holding it. [`Ledger::transact`] holds the write lock for the
//! whole read-plan-validate-apply unit, which makes transactions serializable.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Ledger, Mutation, ReadSet, RequestFilter, SlotFilter, Snapshot, TxnPlan};
use crate::domain::{Slot, SlotId, SlotStatus, SwapRequest, SwapRequestId, SwapStatus};
use crate::error::SwapError;

#[derive(Debug, Default)]
struct LedgerState {
    slots: HashMap<SlotId, Slot>,
    requests: HashMap<SwapRequestId, SwapRequest>,
    pending_by_slot: HashMap<SlotId, SwapRequestId>,
}

impl LedgerState {
    fn snapshot(&self, read: &ReadSet) -> Snapshot {
        let mut snap = Snapshot::default();
        let mut slot_ids = Vec::new();

        for id in &read.requests {
            if let Some(request) = self.requests.get(id) {
                slot_ids.extend(request.slots());
                snap.put_request(request.clone());
            }
        }

        for id in read.lock_order(slot_ids) {
            if let Some(slot) = self.slots.get(&id) {
                snap.put_slot(slot.clone());
            }
            if let Some(request) = self
                .pending_by_slot
                .get(&id)
                .and_then(|rid| self.requests.get(rid))
            {
                snap.put_request(request.clone());
            }
        }
        snap
    }

    fn check(&self, mutation: &Mutation) -> Result<(), SwapError> {
        match mutation {
            Mutation::InsertSlot(slot) => {
                if self.slots.contains_key(&slot.id) {
                    return Err(SwapError::conflict(format!("slot {} already exists", slot.id)));
                }
            }
            Mutation::ReplaceSlot {
                slot,
                expected_status,
            } => {
                self.check_slot_guard(slot.id, *expected_status)?;
            }
            Mutation::DeleteSlot {
                id,
                expected_status,
            } => {
                self.check_slot_guard(*id, *expected_status)?;
                if self.pending_by_slot.contains_key(id) {
                    return Err(SwapError::invariant(format!(
                        "slot {id} is held by a pending request"
                    )));
                }
            }
            Mutation::InsertRequest(request) => {
                if self.requests.contains_key(&request.id) {
                    return Err(SwapError::conflict(format!(
                        "swap request {} already exists",
                        request.id
                    )));
                }
                if request.status == SwapStatus::Pending {
                    for slot in request.slots() {
                        if let Some(holder) = self.pending_by_slot.get(&slot) {
                            return Err(SwapError::invariant(format!(
                                "slot {slot} already held by pending request {holder}"
                            )));
                        }
                    }
                }
            }
            Mutation::ReplaceRequest {
                request,
                expected_status,
            } => {
                let current = self
                    .requests
                    .get(&request.id)
                    .ok_or(SwapError::RequestNotFound(request.id))?;
                if current.status != *expected_status {
                    return Err(SwapError::conflict(format!(
                        "swap request {} is {}, expected {expected_status}",
                        request.id, current.status
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_slot_guard(&self, id: SlotId, expected: SlotStatus) -> Result<(), SwapError> {
        let current = self.slots.get(&id).ok_or(SwapError::SlotNotFound(id))?;
        if current.status != expected {
            return Err(SwapError::conflict(format!(
                "slot {id} is {}, expected {expected}",
                current.status
            )));
        }
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::InsertSlot(slot) | Mutation::ReplaceSlot { slot, .. } => {
                self.slots.insert(slot.id, slot);
            }
            Mutation::DeleteSlot { id, .. } => {
                self.slots.remove(&id);
            }
            Mutation::InsertRequest(request) | Mutation::ReplaceRequest { request, .. } => {
                if request.status == SwapStatus::Pending {
                    for slot in request.slots() {
                        self.pending_by_slot.insert(slot, request.id);
                    }
                } else {
                    for slot in request.slots() {
                        if self.pending_by_slot.get(&slot) == Some(&request.id) {
                            self.pending_by_slot.remove(&slot);
                        }
                    }
                }
                self.requests.insert(request.id, request);
            }
        }
    }
}

/// Process-local [`Ledger`] implementation.
///
/// # Concurrency
///
/// - Reads share the lock and run concurrently.
/// - Transactions take the lock exclusively, so conflicting check-and-set
///   units cannot interleave.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the reservation invariants over the whole ledger: a slot is
    /// `RESERVED_FOR_SWAP` iff exactly one pending request references it.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::InvariantViolation`] describing the first
    /// violation found.
    pub async fn verify_invariants(&self) -> Result<(), SwapError> {
        let state = self.state.read().await;

        let mut holders: HashMap<SlotId, usize> = HashMap::new();
        for request in state.requests.values() {
            if request.status == SwapStatus::Pending {
                for slot in request.slots() {
                    *holders.entry(slot).or_default() += 1;
                }
            }
        }

        for (id, count) in &holders {
            if *count > 1 {
                return Err(SwapError::invariant(format!(
                    "slot {id} referenced by {count} pending requests"
                )));
            }
        }

        for slot in state.slots.values() {
            let held = holders.contains_key(&slot.id);
            let reserved = slot.status == SlotStatus::ReservedForSwap;
            if held != reserved {
                return Err(SwapError::invariant(format!(
                    "slot {} is {} with {} pending request(s)",
                    slot.id,
                    slot.status,
                    usize::from(held)
                )));
            }
        }

        if state.pending_by_slot.len() != holders.len() {
            return Err(SwapError::invariant("pending index out of sync"));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>, SwapError> {
        Ok(self.state.read().await.slots.get(&id).cloned())
    }

    async fn get_request(&self, id: SwapRequestId) -> Result<Option<SwapRequest>, SwapError> {
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn list_slots(&self, filter: SlotFilter) -> Result<Vec<Slot>, SwapError> {
        let state = self.state.read().await;
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        slots.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        Ok(slots)
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<SwapRequest>, SwapError> {
        let state = self.state.read().await;
        let mut requests: Vec<SwapRequest> = state
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn transact(&self, read: ReadSet, plan: &dyn TxnPlan) -> Result<Vec<Mutation>, SwapError> {
        let mut state = self.state.write().await;
        let snapshot = state.snapshot(&read);
        let mutations = plan.plan(&snapshot)?;

        for mutation in &mutations {
            state.check(mutation)?;
        }
        for mutation in mutations.iter().cloned() {
            state.apply(mutation);
        }
        Ok(mutations)
    }
}
