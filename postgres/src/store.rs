//! Events, participants, resources and assignments.

use crate::error::{SetupError, map_sqlx_error, to_i32, to_u32};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use sweepstake_core::error::StoreError;
use sweepstake_core::store::{DrawStore, StoreFuture};
use sweepstake_core::types::{
    Assignment, AssignmentId, EventId, EventStatus, Participant, ParticipantId, Resource,
    ResourceId,
};
use uuid::Uuid;

const ASSIGNMENT_COLUMNS: &str =
    "id, event_id, participant_id, resource_id, draw_order, created_at, reassigned_from, deleted_at";

const RESOURCE_COLUMNS: &str = "id, event_id, number, label, withdrawn, withdrawn_reason, \
     withdrawn_at, version, updated_by";

/// PostgreSQL-backed storage for the draw engine.
///
/// One value implements every durable storage trait: [`DrawStore`],
/// [`sweepstake_core::store::LockStore`], [`sweepstake_core::store::VersionedStore`],
/// [`sweepstake_core::store::CheckpointRepository`] and
/// [`sweepstake_core::store::AuditLog`]. Cloning shares the pool.
///
/// # Example
///
/// ```ignore
/// use sweepstake_postgres::PostgresDrawStore;
///
/// let store = PostgresDrawStore::connect("postgres://localhost/sweepstake", 10).await?;
/// store.migrate().await?;
/// ```
#[derive(Clone, Debug)]
pub struct PostgresDrawStore {
    pool: PgPool,
}

impl PostgresDrawStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pool for `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Connect`] if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, SetupError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(SetupError::Connect)?;
        Ok(Self::new(pool))
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Migrate`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), SetupError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

pub(crate) fn row_to_resource(row: &PgRow) -> Result<Resource, StoreError> {
    let number: i32 = row.try_get("number").map_err(map_sqlx_error)?;
    Ok(Resource {
        id: ResourceId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(map_sqlx_error)?),
        number: to_u32("number", number)?,
        label: row.try_get("label").map_err(map_sqlx_error)?,
        withdrawn: row.try_get("withdrawn").map_err(map_sqlx_error)?,
        withdrawn_reason: row.try_get("withdrawn_reason").map_err(map_sqlx_error)?,
        withdrawn_at: row.try_get("withdrawn_at").map_err(map_sqlx_error)?,
        version: row.try_get("version").map_err(map_sqlx_error)?,
        updated_by: row.try_get("updated_by").map_err(map_sqlx_error)?,
    })
}

fn row_to_participant(row: &PgRow) -> Result<Participant, StoreError> {
    Ok(Participant {
        id: ParticipantId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(map_sqlx_error)?),
        name: row.try_get("name").map_err(map_sqlx_error)?,
        registered_at: row.try_get("registered_at").map_err(map_sqlx_error)?,
        active: row.try_get("active").map_err(map_sqlx_error)?,
    })
}

fn row_to_assignment(row: &PgRow) -> Result<Assignment, StoreError> {
    let draw_order: i32 = row.try_get("draw_order").map_err(map_sqlx_error)?;
    let reassigned_from: Option<Uuid> = row.try_get("reassigned_from").map_err(map_sqlx_error)?;
    Ok(Assignment {
        id: AssignmentId::from_uuid(row.try_get("id").map_err(map_sqlx_error)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(map_sqlx_error)?),
        participant_id: ParticipantId::from_uuid(
            row.try_get("participant_id").map_err(map_sqlx_error)?,
        ),
        resource_id: ResourceId::from_uuid(row.try_get("resource_id").map_err(map_sqlx_error)?),
        draw_order: to_u32("draw_order", draw_order)?,
        created_at: row.try_get("created_at").map_err(map_sqlx_error)?,
        reassigned_from: reassigned_from.map(ResourceId::from_uuid),
        deleted_at: row.try_get("deleted_at").map_err(map_sqlx_error)?,
    })
}

async fn insert_one<'e, E>(executor: E, assignment: &Assignment) -> Result<Assignment, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query(&format!(
        "INSERT INTO assignments ({ASSIGNMENT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {ASSIGNMENT_COLUMNS}"
    ))
    .bind(assignment.id.as_uuid())
    .bind(assignment.event_id.as_uuid())
    .bind(assignment.participant_id.as_uuid())
    .bind(assignment.resource_id.as_uuid())
    .bind(to_i32("draw_order", assignment.draw_order)?)
    .bind(assignment.created_at)
    .bind(assignment.reassigned_from.map(|id| *id.as_uuid()))
    .bind(assignment.deleted_at)
    .fetch_one(executor)
    .await
    .map_err(map_sqlx_error)?;
    row_to_assignment(&row)
}

impl DrawStore for PostgresDrawStore {
    fn event_status(&self, event_id: EventId) -> StoreFuture<'_, Option<EventStatus>> {
        Box::pin(async move {
            let status: Option<String> =
                sqlx::query_scalar("SELECT draw_status FROM events WHERE id = $1")
                    .bind(event_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            status
                .map(|s| s.parse().map_err(StoreError::Serialization))
                .transpose()
        })
    }

    fn set_event_status(&self, event_id: EventId, status: EventStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE events
                SET draw_status = $2, version = version + 1, updated_at = now()
                WHERE id = $1
                ",
            )
            .bind(event_id.as_uuid())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("event {event_id}")));
            }
            tracing::debug!(event_id = %event_id, status = %status, "Event status updated");
            Ok(())
        })
    }

    fn load_participants(&self, event_id: EventId) -> StoreFuture<'_, Vec<Participant>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r"
                SELECT id, event_id, name, registered_at, active
                FROM participants
                WHERE event_id = $1
                ORDER BY registered_at ASC, id ASC
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            rows.iter().map(row_to_participant).collect()
        })
    }

    fn load_resources(&self, event_id: EventId) -> StoreFuture<'_, Vec<Resource>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources WHERE event_id = $1 ORDER BY number ASC"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            rows.iter().map(row_to_resource).collect()
        })
    }

    fn find_resource_by_number(
        &self,
        event_id: EventId,
        number: u32,
    ) -> StoreFuture<'_, Option<Resource>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources WHERE event_id = $1 AND number = $2"
            ))
            .bind(event_id.as_uuid())
            .bind(to_i32("number", number)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            row.as_ref().map(row_to_resource).transpose()
        })
    }

    fn find_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, Vec<Assignment>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
                 WHERE event_id = $1 AND deleted_at IS NULL \
                 ORDER BY draw_order ASC"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            rows.iter().map(row_to_assignment).collect()
        })
    }

    fn find_active_assignment(
        &self,
        event_id: EventId,
        participant_id: ParticipantId,
    ) -> StoreFuture<'_, Option<Assignment>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
                 WHERE event_id = $1 AND participant_id = $2 AND deleted_at IS NULL"
            ))
            .bind(event_id.as_uuid())
            .bind(participant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            row.as_ref().map(row_to_assignment).transpose()
        })
    }

    fn count_active_assignments(&self, event_id: EventId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as(
                r"
                SELECT COUNT(*)
                FROM assignments
                WHERE event_id = $1 AND deleted_at IS NULL
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            u64::try_from(count).map_err(|e| StoreError::Serialization(e.to_string()))
        })
    }

    fn max_draw_order(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let (max,): (i32,) = sqlx::query_as(
                r"
                SELECT COALESCE(MAX(draw_order), 0)
                FROM assignments
                WHERE event_id = $1 AND deleted_at IS NULL
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            to_u32("draw_order", max)
        })
    }

    fn insert_assignment(&self, assignment: Assignment) -> StoreFuture<'_, Assignment> {
        Box::pin(async move { insert_one(&self.pool, &assignment).await })
    }

    fn replace_assignment(
        &self,
        previous: AssignmentId,
        replacement: Assignment,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Assignment>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
            let deleted = sqlx::query(
                r"
                UPDATE assignments
                SET deleted_at = $2
                WHERE id = $1 AND deleted_at IS NULL
                ",
            )
            .bind(previous.as_uuid())
            .bind(deleted_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            if deleted.rows_affected() == 0 {
                return Ok(None);
            }
            let inserted = insert_one(&mut *tx, &replacement).await?;
            tx.commit().await.map_err(map_sqlx_error)?;

            tracing::debug!(%previous, replacement = %inserted.id, "Assignment replaced");
            Ok(Some(inserted))
        })
    }

    fn soft_delete_assignment(
        &self,
        assignment_id: AssignmentId,
        deleted_at: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                UPDATE assignments
                SET deleted_at = $2
                WHERE id = $1 AND deleted_at IS NULL
                ",
            )
            .bind(assignment_id.as_uuid())
            .bind(deleted_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
            Ok(result.rows_affected() > 0)
        })
    }
}
