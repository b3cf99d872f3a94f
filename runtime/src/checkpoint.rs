//! Two-tier checkpoint storage for in-progress draws.
//!
//! Checkpoints are written to the ephemeral cache and to the durable
//! repository. Reads prefer a fresh cached copy and fall back to the durable
//! latest. A checkpoint is only trusted after [`CheckpointStore::validate`]
//! and [`CheckpointStore::is_resumable`] both pass.

use crate::machine::DrawProgress;
use crate::metrics::DrawMetrics;
use chrono::TimeDelta;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use sweepstake_core::environment::{Clock, EngineEnvironment};
use sweepstake_core::store::{CheckpointCache, CheckpointRepository, DrawStore};
use sweepstake_core::types::{
    Assignment, DrawCheckpoint, DrawStep, EventId, EventStatus, PlannedAssignment,
};
use sweepstake_core::{DrawError, Result, StoreError};
use tracing::{debug, warn};

/// SHA-256 (hex) over the step log, assignment snapshot and plan.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the inputs cannot be encoded.
pub fn compute_checksum(
    steps: &[DrawStep],
    assignments: &[Assignment],
    plan: &[PlannedAssignment],
) -> std::result::Result<String, StoreError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(steps)?);
    hasher.update(serde_json::to_vec(assignments)?);
    hasher.update(serde_json::to_vec(plan)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Cache-plus-durable checkpoint storage.
#[derive(Clone)]
pub struct CheckpointStore {
    cache: Arc<dyn CheckpointCache>,
    durable: Arc<dyn CheckpointRepository>,
    draws: Arc<dyn DrawStore>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("freshness", &self.freshness)
            .finish_non_exhaustive()
    }
}

impl CheckpointStore {
    /// Create a store over the environment's cache and repository.
    ///
    /// Cached checkpoints older than `freshness` are ignored by
    /// [`load`](Self::load).
    #[must_use]
    pub fn new(env: &EngineEnvironment, freshness: Duration) -> Self {
        Self {
            cache: Arc::clone(&env.cache),
            durable: Arc::clone(&env.checkpoints),
            draws: Arc::clone(&env.draws),
            clock: Arc::clone(&env.clock),
            freshness,
        }
    }

    /// Snapshot `progress` into both tiers.
    ///
    /// A cache failure is logged and tolerated; the durable write must
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns the durable store's error, or a serialization error while
    /// computing the checksum.
    pub async fn save(&self, progress: &DrawProgress) -> Result<DrawCheckpoint> {
        let checksum = compute_checksum(&progress.steps, &progress.assignments, &progress.plan)?;
        let checkpoint = DrawCheckpoint {
            event_id: progress.event_id,
            status: progress.status,
            current_step: progress.current_step,
            total_steps: progress.total_steps,
            steps: progress.steps.clone(),
            assignments: progress.assignments.clone(),
            plan: progress.plan.clone(),
            seed: progress.seed.clone(),
            initiated_by: progress.initiated_by.clone(),
            saved_at: self.clock.now(),
            checksum,
        };

        if let Err(e) = self.cache.put(checkpoint.clone()).await {
            warn!(event_id = %checkpoint.event_id, error = %e, "Checkpoint cache write failed");
        }
        self.durable.save_checkpoint(checkpoint.clone()).await?;

        DrawMetrics::record_checkpoint();
        debug!(
            event_id = %checkpoint.event_id,
            status = %checkpoint.status,
            current_step = checkpoint.current_step,
            total_steps = checkpoint.total_steps,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Latest checkpoint: the cached copy while fresh, else the durable one.
    ///
    /// # Errors
    ///
    /// Returns the durable store's error. Cache errors fall back to the
    /// durable tier.
    pub async fn load(&self, event_id: EventId) -> Result<Option<DrawCheckpoint>> {
        match self.cache.get(event_id).await {
            Ok(Some(cached)) if self.is_fresh(&cached) => {
                debug!(%event_id, "Checkpoint loaded from cache");
                return Ok(Some(cached));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%event_id, error = %e, "Checkpoint cache read failed, using durable copy");
            }
        }
        Ok(self.durable.latest_checkpoint(event_id).await?)
    }

    fn is_fresh(&self, checkpoint: &DrawCheckpoint) -> bool {
        let age = self.clock.now() - checkpoint.saved_at;
        TimeDelta::from_std(self.freshness).is_ok_and(|limit| age <= limit)
    }

    /// Check integrity of a checkpoint for `event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::CheckpointCorrupted`] naming the first failed check.
    pub fn validate(&self, checkpoint: &DrawCheckpoint, event_id: EventId) -> Result<()> {
        if checkpoint.event_id != event_id {
            return Err(DrawError::CheckpointCorrupted(format!(
                "checkpoint belongs to event {}",
                checkpoint.event_id
            )));
        }
        let expected = compute_checksum(
            &checkpoint.steps,
            &checkpoint.assignments,
            &checkpoint.plan,
        )?;
        if expected != checkpoint.checksum {
            return Err(DrawError::CheckpointCorrupted(
                "checksum mismatch".to_string(),
            ));
        }
        if u32::try_from(checkpoint.steps.len()).ok() != Some(checkpoint.current_step) {
            return Err(DrawError::CheckpointCorrupted(format!(
                "{} steps recorded but current step is {}",
                checkpoint.steps.len(),
                checkpoint.current_step
            )));
        }
        if checkpoint.current_step > checkpoint.total_steps
            || u32::try_from(checkpoint.plan.len()).ok() != Some(checkpoint.total_steps)
        {
            return Err(DrawError::CheckpointCorrupted(format!(
                "step {} of {} does not fit a plan of {}",
                checkpoint.current_step,
                checkpoint.total_steps,
                checkpoint.plan.len()
            )));
        }
        Ok(())
    }

    /// True when durable state agrees with the checkpoint: the event is
    /// still drawing and holds exactly the checkpoint's assignments.
    ///
    /// # Errors
    ///
    /// Returns the store's error if durable state cannot be read.
    pub async fn is_resumable(&self, checkpoint: &DrawCheckpoint) -> Result<bool> {
        let status = self.draws.event_status(checkpoint.event_id).await?;
        if status != Some(EventStatus::Drawing) {
            debug!(event_id = %checkpoint.event_id, ?status, "Event is not drawing");
            return Ok(false);
        }
        let active = self.draws.count_active_assignments(checkpoint.event_id).await?;
        let recorded = u64::try_from(checkpoint.assignments.len()).unwrap_or(u64::MAX);
        if active != recorded {
            debug!(
                event_id = %checkpoint.event_id,
                active,
                recorded,
                "Durable assignments disagree with checkpoint"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete an event's checkpoints from both tiers.
    ///
    /// # Errors
    ///
    /// Returns the durable store's error.
    pub async fn delete(&self, event_id: EventId) -> Result<()> {
        if let Err(e) = self.cache.remove(event_id).await {
            warn!(%event_id, error = %e, "Checkpoint cache delete failed");
        }
        self.durable.delete_checkpoints(event_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use sweepstake_core::types::{DrawStatus, ParticipantId, ResourceId};
    use sweepstake_testing::TestEngine;

    fn progress(event_id: EventId) -> DrawProgress {
        let mut progress = DrawProgress::new(event_id, "admin");
        progress.status = DrawStatus::Drawing;
        progress.total_steps = 2;
        progress.seed = "abc".into();
        progress.plan = (1..=2)
            .map(|order| PlannedAssignment {
                participant_id: ParticipantId::new(),
                resource_id: ResourceId::new(),
                resource_number: order,
                draw_order: order,
            })
            .collect();
        progress
    }

    fn store(engine: &TestEngine) -> CheckpointStore {
        CheckpointStore::new(&engine.environment(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn save_writes_both_tiers_with_checksum() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);

        let saved = checkpoints.save(&progress(event_id)).await.unwrap();

        assert_eq!(saved.checksum.len(), 64);
        assert_eq!(engine.cache.cached(event_id), Some(saved.clone()));
        assert_eq!(engine.store.checkpoints(event_id), vec![saved.clone()]);
        assert!(checkpoints.validate(&saved, event_id).is_ok());
    }

    #[tokio::test]
    async fn cache_outage_does_not_block_saves_or_loads() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);
        engine.cache.set_unavailable(true);

        let saved = checkpoints.save(&progress(event_id)).await.unwrap();
        let loaded = checkpoints.load(event_id).await.unwrap();

        assert_eq!(loaded, Some(saved));
    }

    #[tokio::test]
    async fn stale_cache_entry_falls_back_to_durable() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);
        let saved = checkpoints.save(&progress(event_id)).await.unwrap();

        let mut stale = saved.clone();
        stale.current_step = 99;
        engine.cache.insert(stale.clone());
        assert_eq!(checkpoints.load(event_id).await.unwrap(), Some(stale));

        engine.clock.advance(Duration::from_secs(301));
        assert_eq!(checkpoints.load(event_id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn tampering_is_detected() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);
        let mut saved = checkpoints.save(&progress(event_id)).await.unwrap();

        saved.plan.swap(0, 1);

        assert!(matches!(
            checkpoints.validate(&saved, event_id),
            Err(DrawError::CheckpointCorrupted(_))
        ));
        assert!(matches!(
            checkpoints.validate(&saved, EventId::new()),
            Err(DrawError::CheckpointCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn resumable_only_while_durable_state_agrees() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);
        let saved = checkpoints.save(&progress(event_id)).await.unwrap();

        assert!(!checkpoints.is_resumable(&saved).await.unwrap());

        engine.store.force_event_status(event_id, EventStatus::Drawing);
        assert!(checkpoints.is_resumable(&saved).await.unwrap());

        let mut ahead = saved.clone();
        ahead.assignments.push(Assignment::new(
            event_id,
            ParticipantId::new(),
            ResourceId::new(),
            1,
            engine.clock.now(),
        ));
        assert!(!checkpoints.is_resumable(&ahead).await.unwrap());
    }

    #[tokio::test]
    async fn delete_clears_both_tiers() {
        let engine = TestEngine::new();
        let event_id = engine.store.create_event("Cup");
        let checkpoints = store(&engine);
        checkpoints.save(&progress(event_id)).await.unwrap();

        checkpoints.delete(event_id).await.unwrap();

        assert!(engine.cache.cached(event_id).is_none());
        assert!(checkpoints.load(event_id).await.unwrap().is_none());
    }
}
