//! Optimistic compare-and-swap updates on versioned rows.
//!
//! The current version is read first so a stale caller gets a conflict
//! without touching the row; the write itself is conditioned on the version
//! again, so a writer that slips in between is still detected.

use std::sync::Arc;
use sweepstake_core::environment::EngineEnvironment;
use sweepstake_core::store::VersionedStore;
use sweepstake_core::types::VersionedTable;
use sweepstake_core::{DrawError, Result};
use tracing::debug;
use uuid::Uuid;

/// Result of a compare-and-swap update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The update was applied.
    Updated {
        /// Version after the update.
        version: i64,
    },
    /// The row was not at the expected version.
    Conflict {
        /// Version currently stored.
        current_version: i64,
        /// Actor that produced the current version.
        last_modified_by: Option<String>,
    },
}

impl CasOutcome {
    /// The new version, or [`DrawError::VersionConflict`].
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::VersionConflict`] for [`CasOutcome::Conflict`].
    pub fn into_version(self) -> Result<i64> {
        match self {
            Self::Updated { version } => Ok(version),
            Self::Conflict {
                current_version,
                last_modified_by,
            } => Err(DrawError::VersionConflict {
                current_version,
                last_modified_by,
            }),
        }
    }
}

/// Applies compare-and-swap updates.
#[derive(Clone)]
pub struct VersionedUpdater {
    store: Arc<dyn VersionedStore>,
}

impl std::fmt::Debug for VersionedUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedUpdater").finish_non_exhaustive()
    }
}

impl VersionedUpdater {
    /// Create an updater over the environment's versioned store.
    #[must_use]
    pub fn new(env: &EngineEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.versions),
        }
    }

    /// Apply `fields` to the row if it is still at `expected_version`,
    /// incrementing the version and recording `updated_by`.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NotFound`] if the row does not exist, or the
    /// store error if it cannot be read or written.
    pub async fn compare_and_swap(
        &self,
        table: VersionedTable,
        id: Uuid,
        fields: serde_json::Map<String, serde_json::Value>,
        expected_version: i64,
        updated_by: &str,
    ) -> Result<CasOutcome> {
        let current = self
            .store
            .read_version(table, id)
            .await?
            .ok_or_else(|| DrawError::not_found(table.as_str(), id))?;

        if current.version != expected_version {
            debug!(
                table = table.as_str(),
                %id,
                expected_version,
                current_version = current.version,
                "Version conflict before write"
            );
            return Ok(CasOutcome::Conflict {
                current_version: current.version,
                last_modified_by: current.updated_by,
            });
        }

        let applied = self
            .store
            .conditional_update(table, id, expected_version, fields, updated_by.to_string())
            .await?;
        if let Some(version) = applied {
            return Ok(CasOutcome::Updated { version });
        }

        let current = self
            .store
            .read_version(table, id)
            .await?
            .ok_or_else(|| DrawError::not_found(table.as_str(), id))?;
        debug!(
            table = table.as_str(),
            %id,
            expected_version,
            current_version = current.version,
            "Version conflict during write"
        );
        Ok(CasOutcome::Conflict {
            current_version: current.version,
            last_modified_by: current.updated_by,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;
    use sweepstake_testing::TestEngine;

    fn withdraw() -> serde_json::Map<String, serde_json::Value> {
        json!({ "withdrawn": true, "withdrawn_reason": "lame" })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn applies_update_at_expected_version() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let resource = engine.store.add_resources(event_id, 1).remove(0);
        let updater = VersionedUpdater::new(&engine.environment());

        let outcome = updater
            .compare_and_swap(
                VersionedTable::Resources,
                *resource.id.as_uuid(),
                withdraw(),
                1,
                "steward",
            )
            .await
            .unwrap();

        assert_eq!(outcome, CasOutcome::Updated { version: 2 });
        let stored = engine.store.resource(resource.id).unwrap();
        assert!(stored.withdrawn);
        assert_eq!(stored.updated_by.as_deref(), Some("steward"));
    }

    #[tokio::test]
    async fn stale_version_reports_current_state() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let resource = engine.store.add_resources(event_id, 1).remove(0);
        let updater = VersionedUpdater::new(&engine.environment());
        updater
            .compare_and_swap(
                VersionedTable::Resources,
                *resource.id.as_uuid(),
                withdraw(),
                1,
                "steward",
            )
            .await
            .unwrap();

        let outcome = updater
            .compare_and_swap(
                VersionedTable::Resources,
                *resource.id.as_uuid(),
                withdraw(),
                1,
                "judge",
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CasOutcome::Conflict {
                current_version: 2,
                last_modified_by: Some("steward".to_string()),
            }
        );
        assert!(matches!(
            outcome.into_version(),
            Err(DrawError::VersionConflict { current_version: 2, .. })
        ));
    }

    #[tokio::test]
    async fn missing_row_is_not_found() {
        let engine = TestEngine::new();
        let updater = VersionedUpdater::new(&engine.environment());

        let result = updater
            .compare_and_swap(VersionedTable::Events, Uuid::new_v4(), withdraw(), 1, "x")
            .await;

        assert!(matches!(result, Err(DrawError::NotFound { .. })));
    }
}
