//! Domain types for the draw engine.
//!
//! All types are `Clone` and serializable so they can be captured in
//! checkpoints, audit entries and HTTP responses without conversion layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// True for the all-zero UUID, which never names a stored row.
            #[must_use]
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a sweepstake event.
    EventId
);
uuid_id!(
    /// Unique identifier for a registered participant.
    ParticipantId
);
uuid_id!(
    /// Unique identifier for a drawable resource.
    ResourceId
);
uuid_id!(
    /// Unique identifier for an assignment row.
    AssignmentId
);
uuid_id!(
    /// Token of one lock acquisition. Extensions and releases must present
    /// it, so a holder whose lease expired cannot touch its successor's lock.
    LeaseId
);

// ═══════════════════════════════════════════════════════════════════════
// Event
// ═══════════════════════════════════════════════════════════════════════

/// Draw-related status of an event as stored durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// No draw has run, or the draw was reset.
    #[default]
    Open,
    /// A draw is in progress or paused with a live checkpoint.
    Drawing,
    /// The draw finished and every planned assignment exists.
    Complete,
    /// The draw failed and needs operator attention.
    Error,
    /// Checkpoint data was rejected; a manual reset is required.
    ResetRequired,
}

impl EventStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Drawing => "drawing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::ResetRequired => "reset_required",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "drawing" => Ok(Self::Drawing),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            "reset_required" => Ok(Self::ResetRequired),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// An event that owns participants, resources and assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Display name.
    pub name: String,
    /// Draw status.
    pub status: EventStatus,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Actor that last modified the row.
    pub updated_by: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Participants, Resources, Assignments
// ═══════════════════════════════════════════════════════════════════════

/// An entrant eligible to receive a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant identifier.
    pub id: ParticipantId,
    /// Owning event.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Registration time; earlier registrations are served first by quick draws.
    pub registered_at: DateTime<Utc>,
    /// Inactive participants are never drawn.
    pub active: bool,
}

/// A drawable item (e.g. a competitor) identified by number within its event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Owning event.
    pub event_id: EventId,
    /// Number, unique within the event.
    pub number: u32,
    /// Display label.
    pub label: String,
    /// Withdrawn (scratched) resources are excluded from new draws.
    pub withdrawn: bool,
    /// Reason given when the resource was scratched.
    pub withdrawn_reason: Option<String>,
    /// When the resource was scratched.
    pub withdrawn_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version.
    pub version: i64,
    /// Actor that last modified the row.
    pub updated_by: Option<String>,
}

/// A participant-to-resource binding.
///
/// Rows are never physically deleted; `deleted_at` marks a soft delete and
/// only rows without it count as active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assignment identifier.
    pub id: AssignmentId,
    /// Owning event.
    pub event_id: EventId,
    /// Assigned participant.
    pub participant_id: ParticipantId,
    /// Assigned resource.
    pub resource_id: ResourceId,
    /// Position in the draw, unique among active rows of the event.
    pub draw_order: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Resource this row was reassigned from after a scratch.
    pub reassigned_from: Option<ResourceId>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Build a new active assignment row.
    #[must_use]
    pub fn new(
        event_id: EventId,
        participant_id: ParticipantId,
        resource_id: ResourceId,
        draw_order: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            event_id,
            participant_id,
            resource_id,
            draw_order,
            created_at,
            reassigned_from: None,
            deleted_at: None,
        }
    }

    /// True unless the row has been soft-deleted.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Draw plan and checkpoints
// ═══════════════════════════════════════════════════════════════════════

/// One entry of a computed draw plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAssignment {
    /// Participant to assign.
    pub participant_id: ParticipantId,
    /// Resource to assign.
    pub resource_id: ResourceId,
    /// Number of the resource, kept for reporting.
    pub resource_number: u32,
    /// Draw order of the resulting row.
    pub draw_order: u32,
}

/// Lifecycle status of a draw as tracked by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawStatus {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// Participants and resources are being loaded and shuffled.
    Preparing,
    /// Assignments are being persisted step by step.
    Drawing,
    /// Stepping stopped; a checkpoint allows resuming.
    Paused,
    /// All steps persisted.
    Complete,
    /// The draw failed.
    Error,
}

impl DrawStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Drawing => "drawing",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrawStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "preparing" => Ok(Self::Preparing),
            "drawing" => Ok(Self::Drawing),
            "paused" => Ok(Self::Paused),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown draw status: {other}")),
        }
    }
}

/// A completed draw step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawStep {
    /// Zero-based step index.
    pub step: u32,
    /// Persisted assignment.
    pub assignment_id: AssignmentId,
    /// Participant of the step.
    pub participant_id: ParticipantId,
    /// Resource of the step.
    pub resource_id: ResourceId,
    /// Draw order of the step.
    pub draw_order: u32,
    /// When the step was persisted.
    pub completed_at: DateTime<Utc>,
}

/// Recoverable snapshot of an in-progress draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCheckpoint {
    /// Event being drawn.
    pub event_id: EventId,
    /// Machine status when the checkpoint was taken.
    pub status: DrawStatus,
    /// Index of the next step to execute.
    pub current_step: u32,
    /// Total steps in the plan.
    pub total_steps: u32,
    /// Completed steps.
    pub steps: Vec<DrawStep>,
    /// Assignments persisted so far.
    pub assignments: Vec<Assignment>,
    /// The full planned mapping, so a resume continues the same draw.
    pub plan: Vec<PlannedAssignment>,
    /// Seed reported for the draw.
    pub seed: String,
    /// Actor that started the draw.
    pub initiated_by: String,
    /// When the checkpoint was taken.
    pub saved_at: DateTime<Utc>,
    /// SHA-256 (hex) over steps, assignments and plan.
    pub checksum: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Locks and optimistic concurrency
// ═══════════════════════════════════════════════════════════════════════

/// Identifies a lockable entity: `(resource_type, resource_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockKey {
    /// Kind of entity, e.g. `"draw"`.
    pub resource_type: String,
    /// Entity identifier.
    pub resource_id: String,
}

impl LockKey {
    /// Create a lock key.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Key of the exclusive draw lock for an event.
    #[must_use]
    pub fn draw(event_id: EventId) -> Self {
        Self::new("draw", event_id.to_string())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}

/// A stored lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked entity.
    pub key: LockKey,
    /// Holder identity, for display and conflict reports.
    pub holder: String,
    /// Token issued to this acquisition.
    pub lease_id: LeaseId,
    /// Acquisition time.
    pub acquired_at: DateTime<Utc>,
    /// Hard deadline; the lock is free from this instant on.
    pub expires_at: DateTime<Utc>,
    /// Bumped on every extension.
    pub version: i64,
}

impl LockRecord {
    /// True once `now` has reached the expiry deadline.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tables that carry an optimistic concurrency version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionedTable {
    /// The events table.
    Events,
    /// The resources table.
    Resources,
}

impl VersionedTable {
    /// Table name in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Resources => "resources",
        }
    }
}

/// Current version of a versioned row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Current version.
    pub version: i64,
    /// Actor that produced it.
    pub updated_by: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Audit, mutations and notifications
// ═══════════════════════════════════════════════════════════════════════

/// Append-only record of an administrative or draw action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Event the action concerns, if any.
    pub event_id: Option<EventId>,
    /// Action name, e.g. `"resource.scratched"`.
    pub action: String,
    /// Actor that performed the action.
    pub actor: String,
    /// Structured details.
    pub details: serde_json::Value,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an audit entry.
    #[must_use]
    pub fn new(
        event_id: Option<EventId>,
        action: impl Into<String>,
        actor: impl Into<String>,
        details: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            action: action.into(),
            actor: actor.into(),
            details,
            recorded_at,
        }
    }
}

/// Kinds of mutation published to change listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A draw started stepping.
    DrawStarted,
    /// A paused draw resumed.
    DrawResumed,
    /// A draw paused with a checkpoint.
    DrawPaused,
    /// A draw finished.
    DrawCompleted,
    /// A draw failed or was abandoned.
    DrawFailed,
    /// A draw was reset by an operator.
    DrawReset,
    /// A single assignment was created outside a full draw.
    AssignmentCreated,
    /// A resource was scratched.
    ResourceScratched,
    /// A scratched resource was restored.
    ResourceRestored,
}

/// What a participant should be told after a scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    /// The participant moved to another resource.
    Reassigned {
        /// Scratched resource number.
        from_number: u32,
        /// New resource number.
        to_number: u32,
    },
    /// The participant lost their resource and was not reassigned.
    Unassigned {
        /// Scratched resource number.
        from_number: u32,
    },
}

/// Notification decision produced by a scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDecision {
    /// Event of the scratch.
    pub event_id: EventId,
    /// Participant to notify.
    pub participant_id: ParticipantId,
    /// What happened to them.
    #[serde(flatten)]
    pub kind: NotificationKind,
}
