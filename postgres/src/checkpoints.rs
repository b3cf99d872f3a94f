//! Durable checkpoints and the audit log.

use crate::PostgresDrawStore;
use crate::error::{map_sqlx_error, to_i32};
use sqlx::types::Json;
use sweepstake_core::store::{AuditLog, CheckpointRepository, StoreFuture};
use sweepstake_core::types::{AuditEntry, DrawCheckpoint, EventId};

impl CheckpointRepository for PostgresDrawStore {
    fn save_checkpoint(&self, checkpoint: DrawCheckpoint) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO draw_checkpoints
                    (event_id, status, current_step, total_steps, payload, checksum, saved_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(checkpoint.event_id.as_uuid())
            .bind(checkpoint.status.as_str())
            .bind(to_i32("current_step", checkpoint.current_step)?)
            .bind(to_i32("total_steps", checkpoint.total_steps)?)
            .bind(Json(&checkpoint))
            .bind(&checkpoint.checksum)
            .bind(checkpoint.saved_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            tracing::debug!(
                event_id = %checkpoint.event_id,
                current_step = checkpoint.current_step,
                total_steps = checkpoint.total_steps,
                "Checkpoint persisted"
            );
            Ok(())
        })
    }

    fn latest_checkpoint(&self, event_id: EventId) -> StoreFuture<'_, Option<DrawCheckpoint>> {
        Box::pin(async move {
            let payload: Option<Json<DrawCheckpoint>> = sqlx::query_scalar(
                r"
                SELECT payload
                FROM draw_checkpoints
                WHERE event_id = $1
                ORDER BY saved_at DESC, id DESC
                LIMIT 1
                ",
            )
            .bind(event_id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            Ok(payload.map(|Json(checkpoint)| checkpoint))
        })
    }

    fn delete_checkpoints(&self, event_id: EventId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM draw_checkpoints WHERE event_id = $1")
                .bind(event_id.as_uuid())
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
            tracing::debug!(
                event_id = %event_id,
                removed = result.rows_affected(),
                "Checkpoints deleted"
            );
            Ok(())
        })
    }
}

impl AuditLog for PostgresDrawStore {
    fn record(&self, entry: AuditEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO audit_log (id, event_id, action, actor, details, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(entry.id)
            .bind(entry.event_id.map(|id| *id.as_uuid()))
            .bind(&entry.action)
            .bind(&entry.actor)
            .bind(&entry.details)
            .bind(entry.recorded_at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            Ok(())
        })
    }
}
