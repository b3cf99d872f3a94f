//! Optimistic concurrency on `events` and `resources`.

use crate::PostgresDrawStore;
use crate::error::map_sqlx_error;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};
use sweepstake_core::error::StoreError;
use sweepstake_core::store::{StoreFuture, VersionedStore};
use sweepstake_core::types::{EventStatus, VersionInfo, VersionedTable};
use uuid::Uuid;

enum ColumnValue {
    Bool(bool),
    Text(Option<String>),
    Timestamp(Option<DateTime<Utc>>),
}

fn optional_text(column: &str, value: &Value) -> Result<Option<String>, StoreError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(StoreError::Database(format!(
            "invalid value for {column}: {other}"
        ))),
    }
}

/// Whitelist of updatable columns. Column names pushed into SQL only ever
/// come from this match.
fn column_value(
    table: VersionedTable,
    field: &str,
    value: &Value,
) -> Result<(&'static str, ColumnValue), StoreError> {
    match (table, field) {
        (VersionedTable::Resources, "withdrawn") => value
            .as_bool()
            .map(|b| ("withdrawn", ColumnValue::Bool(b)))
            .ok_or_else(|| StoreError::Database(format!("invalid value for withdrawn: {value}"))),
        (VersionedTable::Resources, "withdrawn_reason") => Ok((
            "withdrawn_reason",
            ColumnValue::Text(optional_text(field, value)?),
        )),
        (VersionedTable::Resources, "withdrawn_at") => {
            let at = optional_text(field, value)?
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| StoreError::Database(format!("invalid withdrawn_at: {e}")))
                })
                .transpose()?;
            Ok(("withdrawn_at", ColumnValue::Timestamp(at)))
        }
        (VersionedTable::Resources, "label") => Ok((
            "label",
            ColumnValue::Text(Some(optional_text(field, value)?.unwrap_or_default())),
        )),
        (VersionedTable::Events, "name") => Ok((
            "name",
            ColumnValue::Text(Some(optional_text(field, value)?.unwrap_or_default())),
        )),
        (VersionedTable::Events, "draw_status") => {
            let status: EventStatus = optional_text(field, value)?
                .unwrap_or_default()
                .parse()
                .map_err(StoreError::Database)?;
            Ok((
                "draw_status",
                ColumnValue::Text(Some(status.as_str().to_string())),
            ))
        }
        (table, other) => Err(StoreError::Database(format!(
            "column {other} is not updatable on {}",
            table.as_str()
        ))),
    }
}

impl VersionedStore for PostgresDrawStore {
    fn read_version(
        &self,
        table: VersionedTable,
        id: Uuid,
    ) -> StoreFuture<'_, Option<VersionInfo>> {
        Box::pin(async move {
            let row: Option<(i64, Option<String>)> = sqlx::query_as(&format!(
                "SELECT version, updated_by FROM {} WHERE id = $1",
                table.as_str()
            ))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
            Ok(row.map(|(version, updated_by)| VersionInfo {
                version,
                updated_by,
            }))
        })
    }

    fn conditional_update(
        &self,
        table: VersionedTable,
        id: Uuid,
        expected_version: i64,
        fields: Map<String, Value>,
        updated_by: String,
    ) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let columns = fields
                .iter()
                .map(|(field, value)| column_value(table, field, value))
                .collect::<Result<Vec<_>, _>>()?;

            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE ");
            builder.push(table.as_str());
            builder.push(" SET version = version + 1, updated_at = now(), updated_by = ");
            builder.push_bind(updated_by);
            for (column, value) in columns {
                builder.push(", ");
                builder.push(column);
                builder.push(" = ");
                match value {
                    ColumnValue::Bool(b) => {
                        builder.push_bind(b);
                    }
                    ColumnValue::Text(text) => {
                        builder.push_bind(text);
                    }
                    ColumnValue::Timestamp(at) => {
                        builder.push_bind(at);
                    }
                }
            }
            builder.push(" WHERE id = ");
            builder.push_bind(id);
            builder.push(" AND version = ");
            builder.push_bind(expected_version);
            builder.push(" RETURNING version");

            let version: Option<i64> = builder
                .build_query_scalar()
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

            if version.is_none() {
                tracing::debug!(
                    table = table.as_str(),
                    id = %id,
                    expected_version,
                    "Conditional update did not apply"
                );
            }
            Ok(version)
        })
    }
}
