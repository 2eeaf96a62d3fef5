//! Transactional ledger: the authoritative store of slots and swap requests.
//!
//! Every state change goes through [`Ledger::transact`]. A transaction locks
//! its [`ReadSet`], hands a consistent [`Snapshot`] to a pure [`TxnPlan`],
//! then applies the returned [`Mutation`]s all-or-nothing. Each mutation
//! carries a guard on the row's prior status, so a plan computed against
//! state that has since changed aborts with [`SwapError::Conflict`] instead
//! of interleaving.
//!
//! Two backends implement the trait: [`MemoryLedger`] and
//! [`crate::persistence::PostgresLedger`].

pub mod memory;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::domain::{Slot, SlotId, SlotStatus, SwapRequest, SwapRequestId, SwapStatus, UserId};
use crate::error::SwapError;

pub use memory::MemoryLedger;

/// Rows a transaction reads and locks.
///
/// Backends widen the set: every slot referenced by a named request, and
/// every pending request referencing a named slot, are included too.
#[derive(Debug, Clone, Default)]
pub struct ReadSet {
    /// Slots to read.
    pub slots: Vec<SlotId>,
    /// Requests to read.
    pub requests: Vec<SwapRequestId>,
}

impl ReadSet {
    /// Read set naming the given slots.
    #[must_use]
    pub fn slots(ids: impl IntoIterator<Item = SlotId>) -> Self {
        Self {
            slots: ids.into_iter().collect(),
            requests: Vec::new(),
        }
    }

    /// Read set naming a single request (and, implicitly, its slots).
    #[must_use]
    pub fn request(id: SwapRequestId) -> Self {
        Self {
            slots: Vec::new(),
            requests: vec![id],
        }
    }

    /// Returns the named slots sorted and deduplicated, the order backends
    /// acquire row locks in.
    #[must_use]
    pub fn lock_order(&self, extra: impl IntoIterator<Item = SlotId>) -> Vec<SlotId> {
        let mut ids: Vec<SlotId> = self.slots.iter().copied().chain(extra).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Consistent view of the rows a transaction locked.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    slots: HashMap<SlotId, Slot>,
    requests: HashMap<SwapRequestId, SwapRequest>,
}

impl Snapshot {
    /// Returns the slot with the given id, if it exists.
    #[must_use]
    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    /// Returns the request with the given id, if it exists.
    #[must_use]
    pub fn request(&self, id: SwapRequestId) -> Option<&SwapRequest> {
        self.requests.get(&id)
    }

    /// Returns every pending request referencing `slot`.
    pub fn pending_for(&self, slot: SlotId) -> impl Iterator<Item = &SwapRequest> {
        self.requests
            .values()
            .filter(move |r| r.status == SwapStatus::Pending && r.references(slot))
    }

    pub(crate) fn put_slot(&mut self, slot: Slot) {
        self.slots.insert(slot.id, slot);
    }

    pub(crate) fn put_request(&mut self, request: SwapRequest) {
        self.requests.insert(request.id, request);
    }
}

/// A guarded row write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert a slot; fails if the id exists.
    InsertSlot(Slot),
    /// Overwrite a slot whose current status is `expected_status`.
    ReplaceSlot {
        /// New row contents.
        slot: Slot,
        /// Status the row must still have.
        expected_status: SlotStatus,
    },
    /// Delete a slot whose current status is `expected_status`.
    DeleteSlot {
        /// Row to delete.
        id: SlotId,
        /// Status the row must still have.
        expected_status: SlotStatus,
    },
    /// Insert a request; a pending one must not hit an already-held slot.
    InsertRequest(SwapRequest),
    /// Overwrite a request whose current status is `expected_status`.
    ReplaceRequest {
        /// New row contents.
        request: SwapRequest,
        /// Status the row must still have.
        expected_status: SwapStatus,
    },
}

impl Mutation {
    /// Returns the request written by this mutation, if any.
    #[must_use]
    pub const fn as_request(&self) -> Option<&SwapRequest> {
        match self {
            Self::InsertRequest(request) | Self::ReplaceRequest { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Returns the slot written by this mutation, if any.
    #[must_use]
    pub const fn as_slot(&self) -> Option<&Slot> {
        match self {
            Self::InsertSlot(slot) | Self::ReplaceSlot { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

/// Decides a transaction's writes from the locked snapshot.
///
/// Plans must be pure: returning `Err` aborts with no mutation.
pub trait TxnPlan: Send + Sync {
    /// Computes the mutations to apply.
    ///
    /// # Errors
    ///
    /// Returns the [`SwapError`] that aborts the transaction.
    fn plan(&self, snapshot: &Snapshot) -> Result<Vec<Mutation>, SwapError>;
}

impl<F> TxnPlan for F
where
    F: Fn(&Snapshot) -> Result<Vec<Mutation>, SwapError> + Send + Sync,
{
    fn plan(&self, snapshot: &Snapshot) -> Result<Vec<Mutation>, SwapError> {
        self(snapshot)
    }
}

/// Pins a closure to the [`TxnPlan`] signature so its argument and error
/// types are inferred at the call site.
pub fn plan<F>(f: F) -> F
where
    F: Fn(&Snapshot) -> Result<Vec<Mutation>, SwapError> + Send + Sync,
{
    f
}

/// Slot listing filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFilter {
    /// Every slot owned by the user.
    OwnedBy(UserId),
    /// Swappable slots not owned by the user.
    SwappableExcept(UserId),
}

impl SlotFilter {
    /// Returns `true` if `slot` passes the filter.
    #[must_use]
    pub fn matches(&self, slot: &Slot) -> bool {
        match self {
            Self::OwnedBy(user) => slot.owner == *user,
            Self::SwappableExcept(user) => {
                slot.status == SlotStatus::Swappable && slot.owner != *user
            }
        }
    }
}

/// Swap request listing filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFilter {
    /// Pending requests addressed to the user.
    IncomingPending(UserId),
    /// Every request the user proposed, in any status.
    OutgoingAll(UserId),
}

impl RequestFilter {
    /// Returns `true` if `request` passes the filter.
    #[must_use]
    pub fn matches(&self, request: &SwapRequest) -> bool {
        match self {
            Self::IncomingPending(user) => {
                request.target_owner == *user && request.status == SwapStatus::Pending
            }
            Self::OutgoingAll(user) => request.requester == *user,
        }
    }
}

/// Authoritative, transactional store of slots and swap requests.
///
/// Listings return slots ordered by `start` then id, and requests newest
/// first.
#[async_trait]
pub trait Ledger: Send + Sync + fmt::Debug {
    /// Reads a slot by id.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on backend failure.
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>, SwapError>;

    /// Reads a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on backend failure.
    async fn get_request(&self, id: SwapRequestId) -> Result<Option<SwapRequest>, SwapError>;

    /// Lists slots passing `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on backend failure.
    async fn list_slots(&self, filter: SlotFilter) -> Result<Vec<Slot>, SwapError>;

    /// Lists requests passing `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`SwapError::Persistence`] on backend failure.
    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<SwapRequest>, SwapError>;

    /// Runs `plan` against the locked `read` set and commits its mutations
    /// atomically. Returns the applied mutations.
    ///
    /// # Errors
    ///
    /// Returns the plan's error, [`SwapError::Conflict`] if a guard no
    /// longer holds, [`SwapError::InvariantViolation`] if a write would break
    /// the one-pending-request-per-slot rule, or
    /// [`SwapError::Persistence`] on backend failure. No mutation is applied
    /// in any error case.
    async fn transact(&self, read: ReadSet, plan: &dyn TxnPlan) -> Result<Vec<Mutation>, SwapError>;
}
