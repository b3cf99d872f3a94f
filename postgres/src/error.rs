//! Classification of `sqlx` failures into [`StoreError`].

use sweepstake_core::error::StoreError;
use thiserror::Error;

/// Errors raised while connecting to or migrating the database.
#[derive(Error, Debug)]
pub enum SetupError {
    /// The pool could not be created.
    #[error("Failed to connect to PostgreSQL: {0}")]
    Connect(#[source] sqlx::Error),

    /// Schema migrations failed.
    #[error("Failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

// SQLSTATE codes that clear up when the transaction is retried.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const ADMIN_SHUTDOWN: &str = "57P01";
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Map a `sqlx` error onto the engine's storage error classes.
///
/// - unique violations keep the constraint name
/// - pool timeouts and serialization conflicts are transient
/// - I/O failures, closed pools and server shutdowns are connection loss
pub(crate) fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    let mapped = match &error {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) => {
                StoreError::Unavailable(db_err.message().to_string())
            }
            Some(ADMIN_SHUTDOWN | CANNOT_CONNECT_NOW) => {
                StoreError::ConnectionLost(db_err.message().to_string())
            }
            _ => StoreError::Database(error.to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout(error.to_string()),
        sqlx::Error::Io(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => StoreError::ConnectionLost(error.to_string()),
        sqlx::Error::RowNotFound => StoreError::NotFound(error.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::Serialization(error.to_string()),
        _ => StoreError::Database(error.to_string()),
    };

    if !mapped.is_unique_violation() {
        metrics::counter!("sweepstake_store_errors_total", "kind" => error_kind(&mapped))
            .increment(1);
    }
    mapped
}

const fn error_kind(error: &StoreError) -> &'static str {
    match error {
        StoreError::UniqueViolation { .. } => "unique_violation",
        StoreError::ConnectionLost(_) => "connection_lost",
        StoreError::Timeout(_) => "timeout",
        StoreError::Unavailable(_) => "unavailable",
        StoreError::NotFound(_) => "not_found",
        StoreError::Database(_) => "database",
        StoreError::Serialization(_) => "serialization",
    }
}

/// Widen a stored `INTEGER` into the engine's unsigned representation.
pub(crate) fn to_u32(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative {column}: {value}")))
}

/// Narrow an engine number into a storable `INTEGER`.
pub(crate) fn to_i32(column: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Database(format!("{column} out of range: {value}")))
}
