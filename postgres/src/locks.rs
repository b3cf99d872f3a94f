//! Lock rows keyed by `(resource_type, resource_id)`.
//!
//! The primary key makes acquisition atomic: of two concurrent inserts for
//! the same key exactly one succeeds and the other reports
//! [`StoreError::UniqueViolation`] on `locks_pkey`.

use crate::PostgresDrawStore;
use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use sweepstake_core::error::StoreError;
use sweepstake_core::store::{LockStore, StoreFuture};
use sweepstake_core::types::{LeaseId, LockKey, LockRecord};

fn row_to_lock(row: &PgRow) -> Result<LockRecord, StoreError> {
    Ok(LockRecord {
        key: LockKey::new(
            row.try_get::<String, _>("resource_type")
                .map_err(map_sqlx_error)?,
            row.try_get::<String, _>("resource_id")
                .map_err(map_sqlx_error)?,
        ),
        holder: row.try_get("holder").map_err(map_sqlx_error)?,
        lease_id: LeaseId::from_uuid(row.try_get("lease_id").map_err(map_sqlx_error)?),
        acquired_at: row.try_get("acquired_at").map_err(map_sqlx_error)?,
        expires_at: row.try_get("expires_at").map_err(map_sqlx_error)?,
        version: row.try_get("version").map_err(map_sqlx_error)?,
    })
}

impl LockStore for PostgresDrawStore {
    fn find_lock(&self, key: LockKey) -> StoreFuture<'_, Option<LockRecord>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT resource_type, resource_id, holder, lease_id, acquired_at, expires_at, version
                FROM locks
                WHERE resource_type = $1 AND resource_id = $2
                ",
            )
            .bind(&key.resource_type)
            .bind(&key.resource_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            row.as_ref().map(row_to_lock).transpose()
        })
    }

    fn insert_lock(&self, record: LockRecord) -> StoreFuture<'_, LockRecord> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO locks (resource_type, resource_id, holder, lease_id, acquired_at, expires_at, version)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING resource_type, resource_id, holder, lease_id, acquired_at, expires_at, version
                ",
            )
            .bind(&record.key.resource_type)
            .bind(&record.key.resource_id)
            .bind(&record.holder)
            .bind(record.lease_id.as_uuid())
            .bind(record.acquired_at)
            .bind(record.expires_at)
            .bind(record.version)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            row_to_lock(&row)
        })
    }

    fn delete_lock(&self, key: LockKey, lease: Option<LeaseId>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                DELETE FROM locks
                WHERE resource_type = $1
                  AND resource_id = $2
                  AND ($3::UUID IS NULL OR lease_id = $3)
                ",
            )
            .bind(&key.resource_type)
            .bind(&key.resource_id)
            .bind(lease.map(|l| *l.as_uuid()))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_lock_if_expired(&self, key: LockKey, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r"
                DELETE FROM locks
                WHERE resource_type = $1 AND resource_id = $2 AND expires_at <= $3
                ",
            )
            .bind(&key.resource_type)
            .bind(&key.resource_id)
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            Ok(result.rows_affected() > 0)
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
            let row = sqlx::query(
                r"
                UPDATE locks
                SET expires_at = $5, version = version + 1
                WHERE resource_type = $1
                  AND resource_id = $2
                  AND lease_id = $3
                  AND expires_at > $4
                RETURNING resource_type, resource_id, holder, lease_id, acquired_at, expires_at, version
                ",
            )
            .bind(&key.resource_type)
            .bind(&key.resource_id)
            .bind(lease.as_uuid())
            .bind(now)
            .bind(expires_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            row.as_ref().map(row_to_lock).transpose()
        })
    }

    fn delete_expired_locks(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM locks WHERE expires_at <= $1")
                .bind(now)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
            Ok(result.rows_affected())
        })
    }
}
