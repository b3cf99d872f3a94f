//! In-memory storage adapters with fault injection.
//!
//! [`InMemoryDrawStore`] implements every durable storage trait and enforces
//! the same uniqueness rules as the `PostgreSQL` schema, so engine tests
//! exercise the real conflict paths. Faults can be queued to simulate
//! timeouts, connection loss and slow writes.

use chrono::{DateTime, Duration as TimeDelta, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sweepstake_core::StoreError;
use sweepstake_core::store::{
    AuditLog, CheckpointCache, CheckpointRepository, DrawStore, LockStore, StoreFuture,
    VersionedStore,
};
use sweepstake_core::types::{
    Assignment, AssignmentId, AuditEntry, DrawCheckpoint, Event, EventId, EventStatus, LeaseId,
    LockKey, LockRecord, Participant, ParticipantId, Resource, ResourceId, VersionInfo,
    VersionedTable,
};
use uuid::Uuid;

/// A queued failure for the next assignment insert.
#[derive(Debug, Clone)]
pub struct InsertFault {
    /// Error to report.
    pub error: StoreError,
    /// Persist the row before reporting the error, like a commit whose
    /// acknowledgement was lost.
    pub after_write: bool,
}

#[derive(Debug, Default)]
struct Faults {
    insert_failures: VecDeque<InsertFault>,
    inserts_before_disconnect: Option<u32>,
    insert_delay: Option<Duration>,
    checkpoint_save_failures: u32,
}

#[derive(Debug, Default)]
struct State {
    events: HashMap<EventId, Event>,
    participants: Vec<Participant>,
    resources: HashMap<ResourceId, Resource>,
    assignments: Vec<Assignment>,
    locks: HashMap<LockKey, LockRecord>,
    checkpoints: HashMap<EventId, Vec<DrawCheckpoint>>,
    audit: Vec<AuditEntry>,
    faults: Faults,
}

impl State {
    fn check_assignment_unique(&self, candidate: &Assignment) -> Result<(), StoreError> {
        for existing in self.assignments.iter().filter(|a| {
            a.is_active() && a.event_id == candidate.event_id && a.id != candidate.id
        }) {
            if existing.participant_id == candidate.participant_id {
                return Err(StoreError::UniqueViolation {
                    constraint: "assignments_active_participant".to_string(),
                });
            }
            if existing.draw_order == candidate.draw_order {
                return Err(StoreError::UniqueViolation {
                    constraint: "assignments_active_draw_order".to_string(),
                });
            }
        }
        if self.assignments.iter().any(|a| a.id == candidate.id) {
            return Err(StoreError::UniqueViolation {
                constraint: "assignments_pkey".to_string(),
            });
        }
        Ok(())
    }

    fn active_assignments(&self, event_id: EventId) -> Vec<Assignment> {
        let mut active: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.event_id == event_id && a.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|a| a.draw_order);
        active
    }

    fn take_connection_budget(&mut self) -> Result<(), StoreError> {
        match self.faults.inserts_before_disconnect {
            Some(0) => Err(StoreError::ConnectionLost(
                "connection reset by peer".to_string(),
            )),
            Some(remaining) => {
                self.faults.inserts_before_disconnect = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Base registration time used by the seeding helpers.
fn registration_base() -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// In-memory implementation of the durable storage traits.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDrawStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryDrawStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Seeding ────────────────────────────────────────────────────────

    /// Create an event in status `open`.
    #[must_use]
    pub fn create_event(&self, name: &str) -> EventId {
        let id = EventId::new();
        self.state().events.insert(
            id,
            Event {
                id,
                name: name.to_string(),
                status: EventStatus::Open,
                version: 1,
                updated_by: None,
            },
        );
        id
    }

    /// Register `count` active participants, one second apart.
    pub fn add_participants(&self, event_id: EventId, count: usize) -> Vec<Participant> {
        let mut state = self.state();
        let offset = state
            .participants
            .iter()
            .filter(|p| p.event_id == event_id)
            .count();
        let created: Vec<Participant> = (0..count)
            .map(|i| {
                let position = offset + i;
                Participant {
                    id: ParticipantId::new(),
                    event_id,
                    name: format!("Participant {}", position + 1),
                    registered_at: registration_base()
                        + TimeDelta::seconds(i64::try_from(position).unwrap_or(i64::MAX)),
                    active: true,
                }
            })
            .collect();
        state.participants.extend(created.iter().cloned());
        created
    }

    /// Add resources numbered `1..=count` after any existing ones.
    pub fn add_resources(&self, event_id: EventId, count: u32) -> Vec<Resource> {
        let start = self
            .state()
            .resources
            .values()
            .filter(|r| r.event_id == event_id)
            .map(|r| r.number)
            .max()
            .unwrap_or(0);
        (1..=count)
            .map(|i| self.add_resource(event_id, start + i))
            .collect()
    }

    /// Add one resource with the given number.
    pub fn add_resource(&self, event_id: EventId, number: u32) -> Resource {
        let resource = Resource {
            id: ResourceId::new(),
            event_id,
            number,
            label: format!("Runner {number}"),
            withdrawn: false,
            withdrawn_reason: None,
            withdrawn_at: None,
            version: 1,
            updated_by: None,
        };
        self.state().resources.insert(resource.id, resource.clone());
        resource
    }

    /// Mark a resource withdrawn directly, bypassing version checks.
    pub fn withdraw_resource(&self, resource_id: ResourceId) {
        if let Some(resource) = self.state().resources.get_mut(&resource_id) {
            resource.withdrawn = true;
            resource.version += 1;
        }
    }

    /// Deactivate a participant.
    pub fn deactivate_participant(&self, participant_id: ParticipantId) {
        if let Some(p) = self
            .state()
            .participants
            .iter_mut()
            .find(|p| p.id == participant_id)
        {
            p.active = false;
        }
    }

    /// Overwrite an event status without bumping the version.
    pub fn force_event_status(&self, event_id: EventId, status: EventStatus) {
        if let Some(event) = self.state().events.get_mut(&event_id) {
            event.status = status;
        }
    }

    /// Insert a lock row directly.
    pub fn put_lock(&self, record: LockRecord) {
        self.state().locks.insert(record.key.clone(), record);
    }

    // ─── Inspection ─────────────────────────────────────────────────────

    /// Snapshot of an event row.
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<Event> {
        self.state().events.get(&event_id).cloned()
    }

    /// Snapshot of a resource row.
    #[must_use]
    pub fn resource(&self, resource_id: ResourceId) -> Option<Resource> {
        self.state().resources.get(&resource_id).cloned()
    }

    /// Every assignment row of an event, soft-deleted ones included.
    #[must_use]
    pub fn all_assignments(&self, event_id: EventId) -> Vec<Assignment> {
        self.state()
            .assignments
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Active assignments ordered by draw order.
    #[must_use]
    pub fn active_assignments(&self, event_id: EventId) -> Vec<Assignment> {
        self.state().active_assignments(event_id)
    }

    /// Current lock row for a key.
    #[must_use]
    pub fn lock(&self, key: &LockKey) -> Option<LockRecord> {
        self.state().locks.get(key).cloned()
    }

    /// Every checkpoint saved for an event, oldest first.
    #[must_use]
    pub fn checkpoints(&self, event_id: EventId) -> Vec<DrawCheckpoint> {
        self.state()
            .checkpoints
            .get(&event_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutate the latest durable checkpoint in place.
    pub fn tamper_latest_checkpoint(
        &self,
        event_id: EventId,
        tamper: impl FnOnce(&mut DrawCheckpoint),
    ) {
        if let Some(latest) = self
            .state()
            .checkpoints
            .get_mut(&event_id)
            .and_then(|all| all.last_mut())
        {
            tamper(latest);
        }
    }

    /// Recorded audit entries, oldest first.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state().audit.clone()
    }

    // ─── Fault injection ────────────────────────────────────────────────

    /// Fail the next `count` assignment inserts with `error`, writing nothing.
    pub fn fail_next_inserts(&self, count: usize, error: &StoreError) {
        let mut state = self.state();
        for _ in 0..count {
            state.faults.insert_failures.push_back(InsertFault {
                error: error.clone(),
                after_write: false,
            });
        }
    }

    /// Persist the next insert but report `error` for it.
    pub fn fail_next_insert_after_write(&self, error: StoreError) {
        self.state().faults.insert_failures.push_back(InsertFault {
            error,
            after_write: true,
        });
    }

    /// Allow `count` more inserts, then report connection loss for every
    /// insert until [`restore_connection`](Self::restore_connection).
    pub fn lose_connection_after_inserts(&self, count: u32) {
        self.state().faults.inserts_before_disconnect = Some(count);
    }

    /// Undo [`lose_connection_after_inserts`](Self::lose_connection_after_inserts).
    pub fn restore_connection(&self) {
        self.state().faults.inserts_before_disconnect = None;
    }

    /// Delay every assignment insert.
    pub fn set_insert_delay(&self, delay: Option<Duration>) {
        self.state().faults.insert_delay = delay;
    }

    /// Fail the next `count` durable checkpoint saves.
    pub fn fail_next_checkpoint_saves(&self, count: u32) {
        self.state().faults.checkpoint_save_failures = count;
    }
}

impl DrawStore for InMemoryDrawStore {
    fn event_status(&self, event_id: EventId) -> StoreFuture<'_, Option<EventStatus>> {
        Box::pin(async move { Ok(self.state().events.get(&event_id).map(|e| e.status)) })
    }

    fn set_event_status(&self, event_id: EventId, status: EventStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            let event = state
                .events
                .get_mut(&event_id)
                .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
            event.status = status;
            event.version += 1;
            Ok(())
        })
    }

    fn load_participants(&self, event_id: EventId) -> StoreFuture<'_, Vec<Participant>> {
        Box::pin(async move {
            let mut participants: Vec<Participant> = self
                .state()
                .participants
                .iter()
                .filter(|p| p.event_id == event_id)
                .cloned()
                .collect();
            participants.sort_by(|a, b| {
                a.registered_at
                    .cmp(&b.registered_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(participants)
        })
    }

    fn load_resources(&self, event_id: EventId) -> StoreFuture<'_, Vec<Resource>> {
        Box::pin(async move {
            let mut resources: Vec<Resource> = self
                .state()
                .resources
                .values()
                .filter(|r| r.event_id == event_id)
                .cloned()
                .collect();
            resources.sort_by_key(|r| r.number);
            Ok(resources)
        })
    }

    fn find_resource_by_number(
        &self,
        event_id: EventId,
        number: u32,
    ) -> StoreFuture<'_, Option<Resource>> {
        Box::pin(async move {
            Ok(self
                .state()
                .resources
                .values()
                .find(|r| r.event_id == event_id && r.number == number)
                .cloned())
        })
    }

    fn find_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, Vec<Assignment>> {
        Box::pin(async move { Ok(self.state().active_assignments(event_id)) })
    }

    fn find_active_assignment(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Assignment>> {
        Box::pin(async move {
            Ok(self
                .state()
                .assignments
                .iter()
                .find(|a| {
                    a.event_id == event_id && a.participant_id == participant_id && a.is_active()
                })
                .cloned())
        })
    }

    fn count_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count = self
                .state()
                .assignments
                .iter()
                .filter(|a| a.event_id == event_id && a.is_active())
                .count();
            Ok(u64::try_from(count).unwrap_or(u64::MAX))
        })
    }

    fn max_draw_order(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            Ok(self
                .state()
                .assignments
                .iter()
                .filter(|a| a.event_id == event_id && a.is_active())
                .map(|a| a.draw_order)
                .max()
                .unwrap_or(0))
        })
    }

    fn insert_assignment(&self, assignment: Assignment) -> StoreFuture<'_, Assignment> {
        Box::pin(async move {
            let delay = self.state().faults.insert_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.state();
            state.take_connection_budget()?;
            let fault = state.faults.insert_failures.pop_front();
            if let Some(fault) = &fault {
                if !fault.after_write {
                    return Err(fault.error.clone());
                }
            }
            state.check_assignment_unique(&assignment)?;
            state.assignments.push(assignment.clone());
            match fault {
                Some(fault) => Err(fault.error),
                None => Ok(assignment),
            }
        })
    }

    fn replace_assignment(
        &self,
        previous: AssignmentId,
        replacement: Assignment,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Assignment>> {
        Box::pin(async move {
            let mut state = self.state();
            state.take_connection_budget()?;
            let fault = state.faults.insert_failures.pop_front();
            if let Some(fault) = &fault {
                if !fault.after_write {
                    return Err(fault.error.clone());
                }
            }
            let Some(index) = state
                .assignments
                .iter()
                .position(|a| a.id == previous && a.is_active())
            else {
                return Ok(None);
            };
            state.assignments[index].deleted_at = Some(deleted_at);
            if let Err(error) = state.check_assignment_unique(&replacement) {
                state.assignments[index].deleted_at = None;
                return Err(error);
            }
            state.assignments.push(replacement.clone());
            match fault {
                Some(fault) => Err(fault.error),
                None => Ok(Some(replacement)),
            }
        })
    }

    fn soft_delete_assignment(
        &self,
        assignment_id: AssignmentId,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state();
            match state
                .assignments
                .iter_mut()
                .find(|a| a.id == assignment_id && a.is_active())
            {
                Some(assignment) => {
                    assignment.deleted_at = Some(deleted_at);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}

impl LockStore for InMemoryDrawStore {
    fn find_lock(&self, key: LockKey) -> StoreFuture<'_, Option<LockRecord>> {
        Box::pin(async move { Ok(self.state().locks.get(&key).cloned()) })
    }

    fn insert_lock(&self, record: LockRecord) -> StoreFuture<'_, LockRecord> {
        Box::pin(async move {
            let mut state = self.state();
            if state.locks.contains_key(&record.key) {
                return Err(StoreError::UniqueViolation {
                    constraint: "locks_pkey".to_string(),
                });
            }
            state.locks.insert(record.key.clone(), record.clone());
            Ok(record)
        })
    }

    fn delete_lock(&self, key: LockKey, lease: Option<LeaseId>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state();
            let matches = state
                .locks
                .get(&key)
                .is_some_and(|lock| lease.is_none_or(|l| l == lock.lease_id));
            if matches {
                state.locks.remove(&key);
            }
            Ok(matches)
        })
    }

    fn delete_lock_if_expired(&self, key: LockKey, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state();
            let expired = state.locks.get(&key).is_some_and(|l| l.is_expired(now));
            if expired {
                state.locks.remove(&key);
            }
            Ok(expired)
        })
    }

    fn extend_lock(
        &self,
        key: LockKey,
        lease: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<LockRecord>> {
        Box::pin(async move {
            let mut state = self.state();
            match state.locks.get_mut(&key) {
                Some(lock) if lock.lease_id == lease && !lock.is_expired(now) => {
                    lock.expires_at = expires_at;
                    lock.version += 1;
                    Ok(Some(lock.clone()))
                }
                _ => Ok(None),
            }
        })
    }

    fn delete_expired_locks(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut state = self.state();
            let before = state.locks.len();
            state.locks.retain(|_, lock| !lock.is_expired(now));
            Ok(u64::try_from(before - state.locks.len()).unwrap_or(u64::MAX))
        })
    }
}

fn optional_string(
    field: &str,
    value: &serde_json::Value,
) -> Result<Option<String>, StoreError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        other => Err(StoreError::Database(format!(
            "invalid value for {field}: {other}"
        ))),
    }
}

fn apply_resource_field(
    resource: &mut Resource,
    field: &str,
    value: &serde_json::Value,
) -> Result<(), StoreError> {
    match field {
        "withdrawn" => {
            resource.withdrawn = value.as_bool().ok_or_else(|| {
                StoreError::Database(format!("invalid value for withdrawn: {value}"))
            })?;
        }
        "withdrawn_reason" => resource.withdrawn_reason = optional_string(field, value)?,
        "withdrawn_at" => {
            resource.withdrawn_at = optional_string(field, value)?
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| StoreError::Database(format!("invalid withdrawn_at: {e}")))
                })
                .transpose()?;
        }
        "label" => resource.label = optional_string(field, value)?.unwrap_or_default(),
        other => {
            return Err(StoreError::Database(format!(
                "column {other} is not updatable on resources"
            )));
        }
    }
    Ok(())
}

fn apply_event_field(
    event: &mut Event,
    field: &str,
    value: &serde_json::Value,
) -> Result<(), StoreError> {
    match field {
        "name" => event.name = optional_string(field, value)?.unwrap_or_default(),
        "draw_status" => {
            event.status = optional_string(field, value)?
                .unwrap_or_default()
                .parse()
                .map_err(StoreError::Database)?;
        }
        other => {
            return Err(StoreError::Database(format!(
                "column {other} is not updatable on events"
            )));
        }
    }
    Ok(())
}

impl VersionedStore for InMemoryDrawStore {
    fn read_version(
        &self,
        table: VersionedTable,
        id: Uuid,
    ) -> StoreFuture<'_, Option<VersionInfo>> {
        Box::pin(async move {
            let state = self.state();
            let info = match table {
                VersionedTable::Events => {
                    state
                        .events
                        .get(&EventId::from_uuid(id))
                        .map(|e| VersionInfo {
                            version: e.version,
                            updated_by: e.updated_by.clone(),
                        })
                }
                VersionedTable::Resources => state
                    .resources
                    .get(&ResourceId::from_uuid(id))
                    .map(|r| VersionInfo {
                        version: r.version,
                        updated_by: r.updated_by.clone(),
                    }),
            };
            Ok(info)
        })
    }

    fn conditional_update(
        &self,
        table: VersionedTable,
        id: Uuid,
        expected_version: i64,
        fields: serde_json::Map<String, serde_json::Value>,
        updated_by: String,
    ) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let mut state = self.state();
            match table {
                VersionedTable::Resources => {
                    let Some(current) = state.resources.get(&ResourceId::from_uuid(id)) else {
                        return Ok(None);
                    };
                    if current.version != expected_version {
                        return Ok(None);
                    }
                    let mut updated = current.clone();
                    for (field, value) in &fields {
                        apply_resource_field(&mut updated, field, value)?;
                    }
                    updated.version += 1;
                    updated.updated_by = Some(updated_by);
                    let version = updated.version;
                    state.resources.insert(updated.id, updated);
                    Ok(Some(version))
                }
                VersionedTable::Events => {
                    let Some(current) = state.events.get(&EventId::from_uuid(id)) else {
                        return Ok(None);
                    };
                    if current.version != expected_version {
                        return Ok(None);
                    }
                    let mut updated = current.clone();
                    for (field, value) in &fields {
                        apply_event_field(&mut updated, field, value)?;
                    }
                    updated.version += 1;
                    updated.updated_by = Some(updated_by);
                    let version = updated.version;
                    state.events.insert(updated.id, updated);
                    Ok(Some(version))
                }
            }
        })
    }
}

impl CheckpointRepository for InMemoryDrawStore {
    fn save_checkpoint(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if state.faults.checkpoint_save_failures > 0 {
                state.faults.checkpoint_save_failures -= 1;
                return Err(StoreError::Timeout("save checkpoint".to_string()));
            }
            state
                .checkpoints
                .entry(checkpoint.event_id)
                .or_default()
                .push(checkpoint);
            Ok(())
        })
    }

    fn latest_checkpoint(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>> {
        Box::pin(async move {
            Ok(self
                .state()
                .checkpoints
                .get(&event_id)
                .and_then(|all| all.last().cloned()))
        })
    }

    fn delete_checkpoints(&self, event_id: EventId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state().checkpoints.remove(&event_id);
            Ok(())
        })
    }
}

impl AuditLog for InMemoryDrawStore {
    fn record(&self, entry: AuditEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.state().audit.push(entry);
            Ok(())
        })
    }
}

/// In-memory checkpoint cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointCache {
    entries: Arc<Mutex<HashMap<EventId, DrawCheckpoint>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl InMemoryCheckpointCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EventId, DrawCheckpoint>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Unavailable("cache offline".to_string()));
        }
        Ok(())
    }

    /// Make every cache call fail until set back to `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    /// Cached checkpoint of an event.
    #[must_use]
    pub fn cached(&self, event_id: EventId) -> Option<DrawCheckpoint> {
        self.entries().get(&event_id).cloned()
    }

    /// Place a checkpoint in the cache directly.
    pub fn insert(&self, checkpoint: DrawCheckpoint) {
        self.entries().insert(checkpoint.event_id, checkpoint);
    }
}

impl CheckpointCache for InMemoryCheckpointCache {
    fn put(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.entries().insert(checkpoint.event_id, checkpoint);
            Ok(())
        })
    }

    fn get(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.entries().get(&event_id).cloned())
        })
    }

    fn remove(&self, event_id: EventId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.entries().remove(&event_id);
            Ok(())
        })
    }
}
