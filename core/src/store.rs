//! Storage abstractions used by the engine.
//!
//! # Design
//!
//! Each trait covers one storage concern so adapters can be mixed: the
//! `PostgreSQL` adapter implements every durable trait, the Redis adapter
//! only [`CheckpointCache`], and the in-memory store in `sweepstake-testing`
//! implements all of them with fault injection.
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so the engine
//! can hold adapters as `Arc<dyn Trait>`. Arguments are taken by value for
//! the same reason: the returned future only borrows `self`.

use crate::error::StoreError;
use crate::types::{
    Assignment, AssignmentId, AuditEntry, DrawCheckpoint, EventId, EventStatus, LeaseId, LockKey,
    LockRecord, MutationKind, NotificationDecision, Participant, ParticipantId, Resource,
    VersionInfo, VersionedTable,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Boxed future returned by storage traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Boxed future for fire-and-forget side effects.
pub type SideEffectFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Durable storage for events, participants, resources and assignments.
pub trait DrawStore: Send + Sync {
    /// Draw status of an event, or `None` if the event does not exist.
    fn event_status(&self, event_id: EventId) -> StoreFuture<'_, Option<EventStatus>>;

    /// Set the draw status of an event, bumping its version.
    fn set_event_status(&self, event_id: EventId, status: EventStatus) -> StoreFuture<'_, ()>;

    /// All participants of an event ordered by registration time, then id.
    fn load_participants(&self, event_id: EventId) -> StoreFuture<'_, Vec<Participant>>;

    /// All resources of an event, withdrawn ones included, ordered by number.
    fn load_resources(&self, event_id: EventId) -> StoreFuture<'_, Vec<Resource>>;

    /// Look a resource up by its number within the event.
    fn find_resource_by_number(
        &self,
        event_id: EventId,
        number: u32,
    ) -> StoreFuture<'_, Option<Resource>>;

    /// Active assignments of an event ordered by draw order.
    fn find_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, Vec<Assignment>>;

    /// The active assignment of one participant, if any.
    fn find_active_assignment(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Assignment>>;

    /// Number of active assignments of an event.
    fn count_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, u64>;

    /// Highest draw order among active assignments, 0 when there are none.
    fn max_draw_order(&self, event_id: EventId) -> StoreFuture<'_, u32>;

    /// Insert one assignment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the participant already has
    /// an active assignment in the event or the draw order is taken.
    fn insert_assignment(&self, assignment: Assignment) -> StoreFuture<'_, Assignment>;

    /// Soft-delete `previous` and insert `replacement` as one unit. Returns
    /// `None`, writing nothing, if `previous` is no longer active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if the replacement clashes with
    /// another active assignment; `previous` then stays active.
    fn replace_assignment(
        &self,
        previous: AssignmentId,
        replacement: Assignment,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Assignment>>;

    /// Soft-delete an assignment. Returns `false` if it was not active.
    fn soft_delete_assignment(
        &self,
        assignment_id: AssignmentId,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool>;
}

/// Storage for lock rows keyed by `(resource_type, resource_id)`.
pub trait LockStore: Send + Sync {
    /// Current lock row, expired or not.
    fn find_lock(&self, key: LockKey) -> StoreFuture<'_, Option<LockRecord>>;

    /// Insert a lock row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] if a row for the key exists.
    fn insert_lock(&self, record: LockRecord) -> StoreFuture<'_, LockRecord>;

    /// Delete a lock row, only if it carries `lease` when one is given.
    fn delete_lock(&self, key: LockKey, lease: Option<LeaseId>) -> StoreFuture<'_, bool>;

    /// Delete a lock row only if it has expired at `now`.
    fn delete_lock_if_expired(&self, key: LockKey, now: DateTime<Utc>) -> StoreFuture<'_, bool>;

    /// Push out the expiry of a lock still held under `lease` and unexpired.
    fn extend_lock(
        &self,
        key: LockKey,
        lease: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<LockRecord>>;

    /// Delete every lock expired at `now`, returning how many were removed.
    fn delete_expired_locks(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64>;
}

/// Rows carrying an optimistic concurrency version.
pub trait VersionedStore: Send + Sync {
    /// Current version of a row, or `None` if it does not exist.
    fn read_version(&self, table: VersionedTable, id: Uuid)
    -> StoreFuture<'_, Option<VersionInfo>>;

    /// Apply `fields` and bump the version, only if the row is still at
    /// `expected_version`. Returns the new version, or `None` if the
    /// condition no longer held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] for fields the table does not allow.
    fn conditional_update(
        &self,
        table: VersionedTable,
        id: Uuid,
        expected_version: i64,
        fields: serde_json::Map<String, serde_json::Value>,
        updated_by: String,
    ) -> StoreFuture<'_, Option<i64>>;
}

/// Durable checkpoint storage.
pub trait CheckpointRepository: Send + Sync {
    /// Persist a checkpoint.
    fn save_checkpoint(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()>;

    /// Most recently saved checkpoint of an event.
    fn latest_checkpoint(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>>;

    /// Delete all checkpoints of an event.
    fn delete_checkpoints(&self, event_id: EventId) -> StoreFuture<'_, ()>;
}

/// Fast, non-authoritative checkpoint storage.
pub trait CheckpointCache: Send + Sync {
    /// Store the latest checkpoint of an event.
    fn put(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()>;

    /// Latest cached checkpoint of an event.
    fn get(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>>;

    /// Drop the cached checkpoint of an event.
    fn remove(&self, event_id: EventId) -> StoreFuture<'_, ()>;
}

/// Append-only audit log.
pub trait AuditLog: Send + Sync {
    /// Record an entry.
    fn record(&self, entry: AuditEntry) -> StoreFuture<'_, ()>;
}

/// Change notification sink for listeners of an event.
pub trait EventEmitter: Send + Sync {
    /// Publish a mutation of an event. Delivery failures are the emitter's
    /// concern and never fail the engine operation.
    fn publish(&self, event_id: EventId, kind: MutationKind) -> SideEffectFuture<'_>;
}

/// Delivery channel for participant notifications.
pub trait Notifier: Send + Sync {
    /// Deliver a notification decision.
    fn notify(&self, decision: NotificationDecision) -> SideEffectFuture<'_>;
}

/// Emitter that discards every mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn publish(&self, _event_id: EventId, _kind: MutationKind) -> SideEffectFuture<'_> {
        Box::pin(async {})
    }
}

/// Notifier that discards every decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _decision: NotificationDecision) -> SideEffectFuture<'_> {
        Box::pin(async {})
    }
}
