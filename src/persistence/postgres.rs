//! PostgreSQL implementation of the ledger.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, Transaction};
use uuid::Uuid;

use super::models::{REQUEST_COLUMNS, SLOT_COLUMNS, SlotRow, SwapRequestRow};
use crate::config::AppConfig;
use crate::domain::{Slot, SlotId, SlotStatus, SwapRequest, SwapRequestId, SwapStatus};
use crate::error::SwapError;
use crate::ledger::{Ledger, Mutation, ReadSet, RequestFilter, SlotFilter, Snapshot, TxnPlan};

/// SQLSTATE codes that mean "another transaction got there first".
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
///
/// `transact` runs in one database transaction: slot rows are locked with
/// `SELECT … FOR UPDATE` in id order, then the named and pending request
/// rows, and every write is an `UPDATE`/`DELETE` guarded on the prior
/// status.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new ledger with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`SwapError::Persistence`] if the database is unreachable.
    pub async fn connect(config: &AppConfig) -> Result<Self, SwapError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(config.database_connect_timeout())
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`SwapError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), SwapError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SwapError::Persistence(e.to_string()))
    }

    async fn lock_snapshot(
        tx: &mut Transaction<'_, Postgres>,
        read: &ReadSet,
    ) -> Result<Snapshot, SwapError> {
        let request_ids: Vec<Uuid> = read.requests.iter().map(|id| *id.as_uuid()).collect();

        // A request's slot references never change, so they can be read
        // unlocked to extend the slot lock set.
        let referenced: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT requester_slot_id, target_slot_id FROM swap_requests WHERE id = ANY($1)",
        )
        .bind(request_ids.as_slice())
        .fetch_all(&mut **tx)
        .await
        .map_err(map_db_error)?;

        let slot_ids: Vec<Uuid> = read
            .lock_order(
                referenced
                    .iter()
                    .flat_map(|(a, b)| [SlotId::from_uuid(*a), SlotId::from_uuid(*b)]),
            )
            .into_iter()
            .map(Uuid::from)
            .collect();

        let slot_sql =
            format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ANY($1) ORDER BY id FOR UPDATE");
        let slot_rows: Vec<SlotRow> = sqlx::query_as(&slot_sql)
            .bind(slot_ids.as_slice())
            .fetch_all(&mut **tx)
            .await
            .map_err(map_db_error)?;

        let request_sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests \
             WHERE id = ANY($1) \
                OR (status = 'PENDING' AND (requester_slot_id = ANY($2) OR target_slot_id = ANY($2))) \
             ORDER BY id FOR UPDATE"
        );
        let request_rows: Vec<SwapRequestRow> = sqlx::query_as(&request_sql)
            .bind(request_ids.as_slice())
            .bind(slot_ids.as_slice())
            .fetch_all(&mut **tx)
            .await
            .map_err(map_db_error)?;

        let mut snapshot = Snapshot::default();
        for row in slot_rows {
            snapshot.put_slot(Slot::try_from(row)?);
        }
        for row in request_rows {
            snapshot.put_request(SwapRequest::try_from(row)?);
        }
        Ok(snapshot)
    }

    async fn apply(
        tx: &mut Transaction<'_, Postgres>,
        mutation: &Mutation,
    ) -> Result<(), SwapError> {
        let affected = match mutation {
            Mutation::InsertSlot(slot) => sqlx::query(
                "INSERT INTO slots (id, title, starts_at, ends_at, location, owner_id, status, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(slot.id.as_uuid())
            .bind(&slot.title)
            .bind(slot.start)
            .bind(slot.end)
            .bind(slot.location.as_deref())
            .bind(slot.owner.as_uuid())
            .bind(slot.status.as_str())
            .bind(slot.created_at)
            .bind(slot.updated_at)
            .execute(&mut **tx)
            .await,

            Mutation::ReplaceSlot {
                slot,
                expected_status,
            } => sqlx::query(
                "UPDATE slots SET title = $2, starts_at = $3, ends_at = $4, location = $5, \
                 owner_id = $6, status = $7, updated_at = $8 \
                 WHERE id = $1 AND status = $9",
            )
            .bind(slot.id.as_uuid())
            .bind(&slot.title)
            .bind(slot.start)
            .bind(slot.end)
            .bind(slot.location.as_deref())
            .bind(slot.owner.as_uuid())
            .bind(slot.status.as_str())
            .bind(slot.updated_at)
            .bind(expected_status.as_str())
            .execute(&mut **tx)
            .await,

            Mutation::DeleteSlot {
                id,
                expected_status,
            } => sqlx::query("DELETE FROM slots WHERE id = $1 AND status = $2")
                .bind(id.as_uuid())
                .bind(expected_status.as_str())
                .execute(&mut **tx)
                .await,

            Mutation::InsertRequest(request) => sqlx::query(
                "INSERT INTO swap_requests (id, requester_id, requester_slot_id, target_owner_id, \
                 target_slot_id, status, created_at, resolved_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(request.id.as_uuid())
            .bind(request.requester.as_uuid())
            .bind(request.requester_slot.as_uuid())
            .bind(request.target_owner.as_uuid())
            .bind(request.target_slot.as_uuid())
            .bind(request.status.as_str())
            .bind(request.created_at)
            .bind(request.resolved_at)
            .execute(&mut **tx)
            .await,

            Mutation::ReplaceRequest {
                request,
                expected_status,
            } => sqlx::query(
                "UPDATE swap_requests SET status = $2, resolved_at = $3 WHERE id = $1 AND status = $4",
            )
            .bind(request.id.as_uuid())
            .bind(request.status.as_str())
            .bind(request.resolved_at)
            .bind(expected_status.as_str())
            .execute(&mut **tx)
            .await,
        }
        .map_err(|e| match (mutation, map_db_error(e)) {
            (Mutation::InsertRequest(request), SwapError::Conflict(_))
                if request.status == SwapStatus::Pending =>
            {
                SwapError::invariant(format!(
                    "a slot of swap request {} is already held by a pending request",
                    request.id
                ))
            }
            (_, err) => err,
        })?
        .rows_affected();

        if affected == 0 {
            return Err(guard_miss(mutation));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn get_slot(&self, id: SlotId) -> Result<Option<Slot>, SwapError> {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = $1");
        sqlx::query_as::<_, SlotRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Slot::try_from)
            .transpose()
    }

    async fn get_request(&self, id: SwapRequestId) -> Result<Option<SwapRequest>, SwapError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE id = $1");
        sqlx::query_as::<_, SwapRequestRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(SwapRequest::try_from)
            .transpose()
    }

    async fn list_slots(&self, filter: SlotFilter) -> Result<Vec<Slot>, SwapError> {
        let (predicate, user) = match filter {
            SlotFilter::OwnedBy(user) => ("owner_id = $1", user),
            SlotFilter::SwappableExcept(user) => ("status = 'SWAPPABLE' AND owner_id <> $1", user),
        };
        let sql =
            format!("SELECT {SLOT_COLUMNS} FROM slots WHERE {predicate} ORDER BY starts_at, id");
        sqlx::query_as::<_, SlotRow>(&sql)
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Slot::try_from)
            .collect()
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<SwapRequest>, SwapError> {
        let (predicate, user) = match filter {
            RequestFilter::IncomingPending(user) => {
                ("target_owner_id = $1 AND status = 'PENDING'", user)
            }
            RequestFilter::OutgoingAll(user) => ("requester_id = $1", user),
        };
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE {predicate} \
             ORDER BY created_at DESC, id"
        );
        sqlx::query_as::<_, SwapRequestRow>(&sql)
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(SwapRequest::try_from)
            .collect()
    }

    async fn transact(&self, read: ReadSet, plan: &dyn TxnPlan) -> Result<Vec<Mutation>, SwapError> {
        let mut tx = self.pool.begin().await?;

        let snapshot = Self::lock_snapshot(&mut tx, &read).await?;
        // Dropping `tx` on any early return rolls the transaction back.
        let mutations = plan.plan(&snapshot)?;
        for mutation in &mutations {
            Self::apply(&mut tx, mutation).await?;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(mutations)
    }
}

/// Maps lost races to [`SwapError::Conflict`]; everything else is a
/// persistence failure.
fn map_db_error(err: sqlx::Error) -> SwapError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return SwapError::conflict(format!("row already exists: {}", db.message()));
            }
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                return SwapError::conflict("concurrent transaction won; re-fetch and retry");
            }
            _ => {}
        }
    }
    SwapError::from(err)
}

fn guard_miss(mutation: &Mutation) -> SwapError {
    match mutation {
        Mutation::ReplaceSlot {
            slot,
            expected_status,
        } => stale_slot(slot.id, *expected_status),
        Mutation::DeleteSlot {
            id,
            expected_status,
        } => stale_slot(*id, *expected_status),
        Mutation::ReplaceRequest {
            request,
            expected_status,
        } => SwapError::conflict(format!(
            "swap request {} is no longer {expected_status}",
            request.id
        )),
        Mutation::InsertSlot(_) | Mutation::InsertRequest(_) => {
            SwapError::Internal("insert affected no rows".to_string())
        }
    }
}

fn stale_slot(id: SlotId, expected: SlotStatus) -> SwapError {
    SwapError::conflict(format!("slot {id} is no longer {expected}"))
}
