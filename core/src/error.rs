//! Error types for storage adapters and engine operations.
//!
//! Storage adapters report [`StoreError`], which classifies failures so the
//! engine can decide between retrying, pausing and failing. Engine operations
//! report [`DrawError`], whose variants map one-to-one onto the error kinds
//! callers see over HTTP.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by storage adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// The connection to the store is gone and will not come back by retrying.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The store is temporarily unavailable (pool exhausted, failover, ...).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The addressed row does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }

    /// Loss of connectivity, which pauses a running draw instead of failing it.
    #[must_use]
    pub const fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// True for uniqueness violations.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Errors reported by engine operations.
#[derive(Error, Debug, Clone)]
pub enum DrawError {
    /// Input was malformed or incomplete.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// There are not enough participants or resources to proceed.
    #[error("Insufficient capacity: {0}")]
    Capacity(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The operation conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another holder owns the lock.
    #[error("Lock {key} is held by {holder} until {expires_at}")]
    LockHeld {
        /// Locked entity, formatted as `type:id`.
        key: String,
        /// Current holder.
        holder: String,
        /// When the current lock expires.
        expires_at: DateTime<Utc>,
    },

    /// The expected version did not match.
    #[error("Version conflict: current version is {current_version}")]
    VersionConflict {
        /// Version currently stored.
        current_version: i64,
        /// Actor that produced the current version.
        last_modified_by: Option<String>,
    },

    /// A draw step could not be persisted.
    #[error("Draw step {step} failed after {attempts} attempt(s): {source}")]
    StepFailed {
        /// Zero-based step index.
        step: u32,
        /// Attempts made, including the first.
        attempts: u32,
        /// Last storage error.
        #[source]
        source: StoreError,
    },

    /// The draw paused and can be resumed from its checkpoint.
    #[error("Draw paused at step {current_step} of {total_steps}")]
    Paused {
        /// Index of the next step to execute.
        current_step: u32,
        /// Total steps in the plan.
        total_steps: u32,
    },

    /// A checkpoint failed validation; the event now requires a manual reset.
    #[error("Checkpoint rejected: {0}")]
    CheckpointCorrupted(String),

    /// Storage failure outside of draw stepping.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DrawError {
    /// Shorthand for [`DrawError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DrawError>;
