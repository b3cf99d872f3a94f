//! Draw orchestration: full draws, quick draws, resume, abandon and reset.
//!
//! A full draw runs under the `("draw", event_id)` lock for its whole
//! duration. Participants and resources are shuffled, mapped round-robin
//! into a plan, and the plan is persisted one assignment per step while the
//! [`DrawMachine`] tracks progress and an autosave task writes checkpoints.
//!
//! Step writes are retried on transient store errors. Connectivity loss
//! pauses the draw with a checkpoint; any other failure moves it to
//! `error`. A paused draw continues with [`DrawOrchestrator::resume_draw`],
//! which only trusts a checkpoint that validates and agrees with durable
//! state. Anything else flags the event `reset_required`.

use crate::allocator::{least_loaded_ranking, plan_assignments};
use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::lock::LockManager;
use crate::machine::{DrawAction, DrawEffect, DrawMachine, DrawProgress, MachineEnvironment};
use crate::metrics::DrawMetrics;
use crate::retry::retry_with_predicate;
use crate::shuffle::{shuffle, shuffle_seeded};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use sweepstake_core::environment::EngineEnvironment;
use sweepstake_core::reducer::{Effects, Reducer};
use sweepstake_core::types::{
    Assignment, AuditEntry, DrawCheckpoint, DrawStatus, EventId, EventStatus, LockKey,
    MutationKind, Participant, PlannedAssignment, Resource,
};
use sweepstake_core::{DrawError, Result, StoreError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Seed reported by a single draw made without one. Single draws do not
/// shuffle; they place the participant on the least-loaded resource.
pub const SINGLE_DRAW_SEED: &str = "least_loaded";

/// Kind of draw requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawType {
    /// Assign every active participant.
    #[default]
    All,
    /// Assign the next unassigned participant only.
    Single,
}

impl FromStr for DrawType {
    type Err = DrawError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(Self::All),
            "single" => Ok(Self::Single),
            other => Err(DrawError::Validation(format!(
                "unknown draw type {other:?}, expected \"all\" or \"single\""
            ))),
        }
    }
}

/// Options of [`DrawOrchestrator::execute_draw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOptions {
    /// Full or single draw.
    pub draw_type: DrawType,
    /// Leave withdrawn resources out of the draw. When false, withdrawn
    /// resources are drawn onto like any other and carry active
    /// assignments afterwards.
    pub skip_withdrawn: bool,
    /// Compute and return the mapping without writing anything.
    pub dry_run: bool,
    /// Seed for a reproducible draw; a secure shuffle is used without one.
    pub seed: Option<String>,
    /// Actor requesting the draw.
    pub initiated_by: String,
}

impl DrawOptions {
    /// A full, persisted, securely shuffled draw.
    #[must_use]
    pub fn all(initiated_by: impl Into<String>) -> Self {
        Self {
            draw_type: DrawType::All,
            skip_withdrawn: true,
            dry_run: false,
            seed: None,
            initiated_by: initiated_by.into(),
        }
    }

    /// A single-participant draw.
    #[must_use]
    pub fn single(initiated_by: impl Into<String>) -> Self {
        Self {
            draw_type: DrawType::Single,
            ..Self::all(initiated_by)
        }
    }

    /// Use a seeded shuffle.
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<String>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    /// Only compute the mapping.
    #[must_use]
    pub const fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Figures reported with a draw outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawStats {
    /// Active participants considered.
    pub participant_count: usize,
    /// Resources drawn onto.
    pub resource_count: usize,
    /// Assignments written by this call.
    pub assignments_created: usize,
    /// Seed of the shuffle, given or generated. A single draw without a
    /// seed reports [`SINGLE_DRAW_SEED`].
    pub seed: String,
    /// Wall time of the call.
    pub execution_time_ms: u64,
}

/// Result of a draw or resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOutcome {
    /// Event drawn.
    pub event_id: EventId,
    /// Persisted assignments of the draw, in draw order.
    pub assignments: Vec<Assignment>,
    /// The computed mapping; for a dry run this is the only result.
    pub plan: Vec<PlannedAssignment>,
    /// Numbers of withdrawn resources left out.
    pub skipped_resource_numbers: Vec<u32>,
    /// Summary figures.
    pub stats: DrawStats,
    /// True when nothing was written.
    pub dry_run: bool,
}

/// Progress of a draw that has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawProgressSummary {
    /// Machine status at the last checkpoint.
    pub status: DrawStatus,
    /// Steps persisted.
    pub current_step: u32,
    /// Steps planned.
    pub total_steps: u32,
}

/// Answer of [`DrawOrchestrator::get_draw_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawStatusReport {
    /// Event asked about.
    pub event_id: EventId,
    /// Event draw status.
    pub status: EventStatus,
    /// True once any active assignment exists.
    pub has_drawn: bool,
    /// Active assignments in draw order.
    pub assignments: Vec<Assignment>,
    /// Checkpointed progress while a draw is unfinished.
    pub progress: Option<DrawProgressSummary>,
}

/// Answer of [`DrawOrchestrator::reset_draw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    /// Event reset.
    pub event_id: EventId,
    /// Status before the reset.
    pub previous_status: EventStatus,
    /// Active assignments soft-deleted.
    pub removed_assignments: usize,
}

struct DrawInputs {
    participants: Vec<Participant>,
    resources: Vec<Resource>,
    skipped_resource_numbers: Vec<u32>,
}

enum StepFailure {
    Paused(String),
    Failed(DrawError),
}

/// Checkpoint writer of a running draw. Dropping it aborts the task;
/// [`Autosave::stop`] also waits for the task to end, so no save can land
/// after the caller's own checkpoint writes.
struct Autosave(Option<JoinHandle<()>>);

impl Autosave {
    async fn stop(mut self) {
        let Some(handle) = self.0.take() else {
            return;
        };
        handle.abort();
        if let Err(e) = handle.await {
            if e.is_panic() {
                warn!(error = %e, "Autosave task panicked");
            }
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

fn single_draw_seed(options: &DrawOptions) -> String {
    options
        .seed
        .clone()
        .unwrap_or_else(|| SINGLE_DRAW_SEED.to_string())
}

fn lock_progress(progress: &Mutex<DrawProgress>) -> MutexGuard<'_, DrawProgress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn draw_outcome_label(result: &Result<DrawOutcome>) -> &'static str {
    match result {
        Ok(outcome) if outcome.dry_run => "dry_run",
        Ok(_) => "completed",
        Err(DrawError::Paused { .. }) => "paused",
        Err(
            DrawError::Conflict(_)
            | DrawError::LockHeld { .. }
            | DrawError::CheckpointCorrupted(_),
        ) => "conflict",
        Err(DrawError::Validation(_) | DrawError::Capacity(_) | DrawError::NotFound { .. }) => {
            "rejected"
        }
        Err(_) => "failed",
    }
}

/// Runs draws for events.
pub struct DrawOrchestrator {
    env: EngineEnvironment,
    config: EngineConfig,
    locks: Arc<LockManager>,
    checkpoints: CheckpointStore,
    machine: DrawMachine,
    machine_env: MachineEnvironment,
    pause_requests: Mutex<HashSet<EventId>>,
    running: Mutex<HashSet<EventId>>,
}

impl std::fmt::Debug for DrawOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DrawOrchestrator {
    /// Create an orchestrator with its own lock manager.
    #[must_use]
    pub fn new(env: EngineEnvironment, config: EngineConfig) -> Self {
        let locks = Arc::new(LockManager::new(&env));
        Self::with_lock_manager(env, config, locks)
    }

    /// Create an orchestrator sharing `locks` with other services.
    #[must_use]
    pub fn with_lock_manager(
        env: EngineEnvironment,
        config: EngineConfig,
        locks: Arc<LockManager>,
    ) -> Self {
        let checkpoints = CheckpointStore::new(&env, config.checkpoint_freshness);
        let machine_env = MachineEnvironment::new(Arc::clone(&env.clock));
        Self {
            env,
            config,
            locks,
            checkpoints,
            machine: DrawMachine,
            machine_env,
            pause_requests: Mutex::new(HashSet::new()),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// The lock manager draws run under.
    #[must_use]
    pub const fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// The checkpoint store draws write to.
    #[must_use]
    pub const fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Execute a draw for an event.
    ///
    /// # Errors
    ///
    /// - [`DrawError::Validation`] for a nil event id or missing actor
    /// - [`DrawError::NotFound`] if the event does not exist
    /// - [`DrawError::Capacity`] without participants or resources
    /// - [`DrawError::LockHeld`] while another draw holds the event lock
    /// - [`DrawError::Conflict`] if the event was already drawn, is
    ///   mid-draw, or needs a reset
    /// - [`DrawError::Paused`] if the draw paused with a checkpoint
    /// - [`DrawError::StepFailed`] if a step exhausted its retries
    pub async fn execute_draw(
        &self,
        event_id: EventId,
        options: DrawOptions,
    ) -> Result<DrawOutcome> {
        let started = Instant::now();
        let result = self.execute_draw_inner(event_id, &options, started).await;
        DrawMetrics::record_draw(draw_outcome_label(&result), started.elapsed());
        match &result {
            Ok(outcome) => info!(
                %event_id,
                draw_type = ?options.draw_type,
                dry_run = outcome.dry_run,
                assignments = outcome.stats.assignments_created,
                execution_time_ms = outcome.stats.execution_time_ms,
                "Draw finished"
            ),
            Err(e) => warn!(%event_id, draw_type = ?options.draw_type, error = %e, "Draw did not complete"),
        }
        result
    }

    async fn execute_draw_inner(
        &self,
        event_id: EventId,
        options: &DrawOptions,
        started: Instant,
    ) -> Result<DrawOutcome> {
        validate_request(event_id, &options.initiated_by)?;
        self.event_status(event_id).await?;

        if options.dry_run {
            return self.dry_run(event_id, options, started).await;
        }

        let key = LockKey::draw(event_id);
        self.locks
            .with_lock(
                &key,
                &options.initiated_by,
                self.config.lock_ttl,
                Some(self.config.lock_extend_interval),
                || async {
                    match options.draw_type {
                        DrawType::All => self.run_full_draw(event_id, options, started).await,
                        DrawType::Single => self.run_single_draw(event_id, options, started).await,
                    }
                },
            )
            .await
    }

    async fn dry_run(
        &self,
        event_id: EventId,
        options: &DrawOptions,
        started: Instant,
    ) -> Result<DrawOutcome> {
        let inputs = self.load_inputs(event_id, options.skip_withdrawn).await?;
        let (plan, seed) = match options.draw_type {
            DrawType::All => {
                let first_order = self.env.draws.max_draw_order(event_id).await? + 1;
                self.compute_plan(&inputs, options.seed.as_deref(), first_order)?
            }
            DrawType::Single => (
                vec![self.plan_single(event_id, &inputs).await?],
                single_draw_seed(options),
            ),
        };
        debug!(%event_id, steps = plan.len(), draw_type = ?options.draw_type, "Dry run computed");
        Ok(DrawOutcome {
            event_id,
            assignments: Vec::new(),
            skipped_resource_numbers: inputs.skipped_resource_numbers,
            stats: DrawStats {
                participant_count: inputs.participants.len(),
                resource_count: inputs.resources.len(),
                assignments_created: 0,
                seed,
                execution_time_ms: elapsed_ms(started),
            },
            plan,
            dry_run: true,
        })
    }

    async fn run_full_draw(
        &self,
        event_id: EventId,
        options: &DrawOptions,
        started: Instant,
    ) -> Result<DrawOutcome> {
        self.ensure_drawable(event_id).await?;

        let inputs = self.load_inputs(event_id, options.skip_withdrawn).await?;
        let progress = Arc::new(Mutex::new(DrawProgress::new(
            event_id,
            options.initiated_by.clone(),
        )));
        self.transition(
            &progress,
            DrawAction::Prepare {
                participant_count: inputs.participants.len(),
                resource_count: inputs.resources.len(),
            },
        )
        .map_err(DrawError::Capacity)?;

        let first_order = self.env.draws.max_draw_order(event_id).await? + 1;
        let (plan, seed) = self.compute_plan(&inputs, options.seed.as_deref(), first_order)?;
        let effects = self
            .transition(
                &progress,
                DrawAction::Start {
                    plan: plan.clone(),
                    seed: seed.clone(),
                },
            )
            .map_err(DrawError::Conflict)?;
        self.run_effects(&progress, effects).await?;
        info!(%event_id, steps = plan.len(), %seed, "Draw started");

        let _running = self.mark_running(event_id);
        let created = self.drive(&progress).await?;

        let snapshot = lock_progress(&progress).clone();
        self.audit_completion(&snapshot, inputs.participants.len(), inputs.resources.len())
            .await;
        DrawMetrics::record_assignments(created);

        Ok(DrawOutcome {
            event_id,
            assignments: snapshot.assignments,
            plan,
            skipped_resource_numbers: inputs.skipped_resource_numbers,
            stats: DrawStats {
                participant_count: inputs.participants.len(),
                resource_count: inputs.resources.len(),
                assignments_created: created,
                seed,
                execution_time_ms: elapsed_ms(started),
            },
            dry_run: false,
        })
    }

    async fn run_single_draw(
        &self,
        event_id: EventId,
        options: &DrawOptions,
        started: Instant,
    ) -> Result<DrawOutcome> {
        match self.event_status(event_id).await? {
            EventStatus::Drawing => {
                return Err(DrawError::Conflict(
                    "a full draw is in progress; resume or reset it first".to_string(),
                ));
            }
            EventStatus::ResetRequired | EventStatus::Error => {
                return Err(DrawError::Conflict(
                    "event requires a manual reset before drawing".to_string(),
                ));
            }
            EventStatus::Open | EventStatus::Complete => {}
        }

        let inputs = self.load_inputs(event_id, options.skip_withdrawn).await?;
        let planned = self.plan_single(event_id, &inputs).await?;
        let assignment = Assignment::new(
            event_id,
            planned.participant_id,
            planned.resource_id,
            planned.draw_order,
            self.env.clock.now(),
        );
        let stored = match self.persist_step(0, assignment).await {
            Ok(stored) => stored,
            Err(StepFailure::Paused(reason)) => {
                return Err(DrawError::Store(StoreError::ConnectionLost(reason)));
            }
            Err(StepFailure::Failed(error)) => return Err(error),
        };

        self.record_audit(
            event_id,
            "draw.single",
            &options.initiated_by,
            json!({
                "participant_id": stored.participant_id,
                "resource_number": planned.resource_number,
                "draw_order": stored.draw_order,
            }),
        )
        .await;
        self.env
            .emitter
            .publish(event_id, MutationKind::AssignmentCreated)
            .await;
        DrawMetrics::record_assignments(1);

        Ok(DrawOutcome {
            event_id,
            assignments: vec![stored],
            plan: vec![planned],
            skipped_resource_numbers: inputs.skipped_resource_numbers,
            stats: DrawStats {
                participant_count: inputs.participants.len(),
                resource_count: inputs.resources.len(),
                assignments_created: 1,
                seed: single_draw_seed(options),
                execution_time_ms: elapsed_ms(started),
            },
            dry_run: false,
        })
    }

    /// The first unassigned active participant, placed on the least-loaded
    /// resource after the highest active draw order.
    async fn plan_single(&self, event_id: EventId, inputs: &DrawInputs) -> Result<PlannedAssignment> {
        if inputs.resources.is_empty() {
            return Err(DrawError::Capacity(
                "no available resources to draw".to_string(),
            ));
        }
        let active = self.env.draws.find_active_assignments(event_id).await?;
        let assigned: HashSet<_> = active.iter().map(|a| a.participant_id).collect();
        let Some(participant) = inputs
            .participants
            .iter()
            .find(|p| !assigned.contains(&p.id))
        else {
            return Err(DrawError::Conflict(
                "every active participant already has an assignment".to_string(),
            ));
        };

        let mut loads: HashMap<_, usize> = HashMap::new();
        for assignment in &active {
            *loads.entry(assignment.resource_id).or_insert(0) += 1;
        }
        let ranked = least_loaded_ranking(&inputs.resources, &loads);
        let Some(resource) = ranked.first() else {
            return Err(DrawError::Capacity(
                "no available resources to draw".to_string(),
            ));
        };

        let draw_order = active
            .iter()
            .map(|a| a.draw_order)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| DrawError::Validation("draw order overflow".to_string()))?;
        Ok(PlannedAssignment {
            participant_id: participant.id,
            resource_id: resource.id,
            resource_number: resource.number,
            draw_order,
        })
    }

    /// Continue a paused or interrupted draw from its checkpoint.
    ///
    /// A checkpoint that fails validation, or disagrees with durable state,
    /// is never resumed: the event is flagged `reset_required` and an audit
    /// entry records why.
    ///
    /// # Errors
    ///
    /// - [`DrawError::Conflict`] if no draw is in progress
    /// - [`DrawError::CheckpointCorrupted`] if the checkpoint is missing,
    ///   invalid or stale
    /// - the errors of [`execute_draw`](Self::execute_draw) while stepping
    pub async fn resume_draw(&self, event_id: EventId, initiated_by: &str) -> Result<DrawOutcome> {
        let started = Instant::now();
        let result = self.resume_draw_inner(event_id, initiated_by, started).await;
        DrawMetrics::record_draw(draw_outcome_label(&result), started.elapsed());
        if let Err(e) = &result {
            warn!(%event_id, error = %e, "Resume did not complete");
        }
        result
    }

    async fn resume_draw_inner(
        &self,
        event_id: EventId,
        initiated_by: &str,
        started: Instant,
    ) -> Result<DrawOutcome> {
        validate_request(event_id, initiated_by)?;
        self.event_status(event_id).await?;

        let key = LockKey::draw(event_id);
        self.locks
            .with_lock(
                &key,
                initiated_by,
                self.config.lock_ttl,
                Some(self.config.lock_extend_interval),
                || async {
                    let checkpoint = self.trusted_checkpoint(event_id, initiated_by).await?;
                    let resumed_from = checkpoint.current_step;
                    let progress = Arc::new(Mutex::new(DrawProgress::new(event_id, initiated_by)));
                    let effects = self
                        .transition(&progress, DrawAction::Resume { checkpoint })
                        .map_err(DrawError::CheckpointCorrupted)?;
                    self.run_effects(&progress, effects).await?;
                    info!(%event_id, resumed_from, %initiated_by, "Draw resumed");

                    let _running = self.mark_running(event_id);
                    let created = self.drive(&progress).await?;

                    let snapshot = lock_progress(&progress).clone();
                    let participant_count = snapshot.plan.len();
                    let resource_count = snapshot
                        .plan
                        .iter()
                        .map(|p| p.resource_id)
                        .collect::<HashSet<_>>()
                        .len();
                    self.audit_completion(&snapshot, participant_count, resource_count)
                        .await;
                    DrawMetrics::record_assignments(created);

                    Ok(DrawOutcome {
                        event_id,
                        assignments: snapshot.assignments,
                        plan: snapshot.plan,
                        skipped_resource_numbers: Vec::new(),
                        stats: DrawStats {
                            participant_count,
                            resource_count,
                            assignments_created: created,
                            seed: snapshot.seed,
                            execution_time_ms: elapsed_ms(started),
                        },
                        dry_run: false,
                    })
                },
            )
            .await
    }

    /// Give up on an unfinished draw, moving it to `error`.
    ///
    /// Persisted assignments stay in place; use
    /// [`reset_draw`](Self::reset_draw) to clear them.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::Conflict`] if no draw is in progress, or
    /// [`DrawError::LockHeld`] while the draw is still running.
    pub async fn abandon_draw(&self, event_id: EventId, actor: &str) -> Result<()> {
        validate_request(event_id, actor)?;
        let key = LockKey::draw(event_id);
        self.locks
            .with_lock(&key, actor, self.config.lock_ttl, None, || async {
                if self.event_status(event_id).await? != EventStatus::Drawing {
                    return Err(DrawError::Conflict(
                        "no draw in progress to abandon".to_string(),
                    ));
                }
                let mut progress = match self.checkpoints.load(event_id).await {
                    Ok(Some(checkpoint)) => DrawProgress::from_checkpoint(checkpoint),
                    Ok(None) => DrawProgress::new(event_id, actor),
                    Err(e) => {
                        warn!(%event_id, error = %e, "Checkpoint unreadable while abandoning");
                        DrawProgress::new(event_id, actor)
                    }
                };
                progress.status = DrawStatus::Paused;
                let progress = Arc::new(Mutex::new(progress));
                let effects = self
                    .transition(
                        &progress,
                        DrawAction::Fail {
                            reason: format!("abandoned by {actor}"),
                        },
                    )
                    .map_err(DrawError::Conflict)?;
                self.run_effects(&progress, effects).await?;

                let current_step = lock_progress(&progress).current_step;
                self.record_audit(
                    event_id,
                    "draw.abandoned",
                    actor,
                    json!({ "current_step": current_step }),
                )
                .await;
                info!(%event_id, %actor, current_step, "Draw abandoned");
                Ok(())
            })
            .await
    }

    /// Administrative reset: soft-delete every active assignment, drop
    /// checkpoints and reopen the event.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::Conflict`] for a completed draw, or
    /// [`DrawError::LockHeld`] while a draw is running.
    pub async fn reset_draw(&self, event_id: EventId, actor: &str) -> Result<ResetOutcome> {
        validate_request(event_id, actor)?;
        let key = LockKey::draw(event_id);
        self.locks
            .with_lock(&key, actor, self.config.lock_ttl, None, || async {
                let previous_status = self.event_status(event_id).await?;
                if previous_status == EventStatus::Complete {
                    return Err(DrawError::Conflict(
                        "completed draws cannot be reset".to_string(),
                    ));
                }

                let now = self.env.clock.now();
                let mut removed_assignments = 0;
                for assignment in self.env.draws.find_active_assignments(event_id).await? {
                    if self
                        .env
                        .draws
                        .soft_delete_assignment(assignment.id, now)
                        .await?
                    {
                        removed_assignments += 1;
                    }
                }
                self.checkpoints.delete(event_id).await?;
                self.env
                    .draws
                    .set_event_status(event_id, EventStatus::Open)
                    .await?;

                self.record_audit(
                    event_id,
                    "draw.reset",
                    actor,
                    json!({
                        "previous_status": previous_status.as_str(),
                        "removed_assignments": removed_assignments,
                    }),
                )
                .await;
                self.env
                    .emitter
                    .publish(event_id, MutationKind::DrawReset)
                    .await;
                info!(%event_id, %actor, %previous_status, removed_assignments, "Draw reset");

                Ok(ResetOutcome {
                    event_id,
                    previous_status,
                    removed_assignments,
                })
            })
            .await
    }

    /// Ask a draw running in this process to pause at the next step
    /// boundary. Returns false if no such draw is running here.
    pub fn request_pause(&self, event_id: EventId) -> bool {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&event_id);
        if running {
            self.pause_requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(event_id);
            info!(%event_id, "Pause requested");
        }
        running
    }

    /// Draw state of an event.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NotFound`] if the event does not exist.
    pub async fn get_draw_status(&self, event_id: EventId) -> Result<DrawStatusReport> {
        let status = self.event_status(event_id).await?;
        let assignments = self.env.draws.find_active_assignments(event_id).await?;
        let progress = if status == EventStatus::Drawing {
            self.checkpoints
                .load(event_id)
                .await?
                .map(|checkpoint| DrawProgressSummary {
                    status: checkpoint.status,
                    current_step: checkpoint.current_step,
                    total_steps: checkpoint.total_steps,
                })
        } else {
            None
        };
        Ok(DrawStatusReport {
            event_id,
            status,
            has_drawn: !assignments.is_empty(),
            assignments,
            progress,
        })
    }

    // ─── Internals ──────────────────────────────────────────────────────

    async fn event_status(&self, event_id: EventId) -> Result<EventStatus> {
        self.env
            .draws
            .event_status(event_id)
            .await?
            .ok_or_else(|| DrawError::not_found("event", event_id))
    }

    async fn ensure_drawable(&self, event_id: EventId) -> Result<()> {
        match self.event_status(event_id).await? {
            EventStatus::Drawing => Err(DrawError::Conflict(
                "a draw is already in progress; use resume_draw to continue it".to_string(),
            )),
            EventStatus::ResetRequired => Err(DrawError::Conflict(
                "event requires a manual reset before drawing".to_string(),
            )),
            EventStatus::Error => Err(DrawError::Conflict(
                "previous draw failed; reset the event before drawing again".to_string(),
            )),
            EventStatus::Complete => Err(DrawError::Conflict(
                "draw already executed for this event".to_string(),
            )),
            EventStatus::Open => {
                if self.env.draws.count_active_assignments(event_id).await? > 0 {
                    return Err(DrawError::Conflict(
                        "draw already executed for this event".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    async fn load_inputs(&self, event_id: EventId, skip_withdrawn: bool) -> Result<DrawInputs> {
        let participants: Vec<_> = self
            .env
            .draws
            .load_participants(event_id)
            .await?
            .into_iter()
            .filter(|p| p.active)
            .collect();
        let (withdrawn, available): (Vec<_>, Vec<_>) = self
            .env
            .draws
            .load_resources(event_id)
            .await?
            .into_iter()
            .partition(|r| r.withdrawn);

        let (resources, skipped_resource_numbers) = if skip_withdrawn {
            (available, withdrawn.iter().map(|r| r.number).collect())
        } else {
            let mut all = available;
            all.extend(withdrawn);
            all.sort_by_key(|r| r.number);
            (all, Vec::new())
        };

        debug!(
            %event_id,
            participants = participants.len(),
            resources = resources.len(),
            skipped = skipped_resource_numbers.len(),
            "Draw inputs loaded"
        );
        Ok(DrawInputs {
            participants,
            resources,
            skipped_resource_numbers,
        })
    }

    /// Shuffle participants (seeded or secure) and resources (seeded from
    /// the participant seed), then map them round-robin.
    fn compute_plan(
        &self,
        inputs: &DrawInputs,
        seed: Option<&str>,
        first_order: u32,
    ) -> Result<(Vec<PlannedAssignment>, String)> {
        let participants = shuffle(
            inputs.participants.clone(),
            seed,
            self.config.swap_index_policy,
        );
        let resources = shuffle_seeded(
            inputs.resources.clone(),
            &format!("{}:resources", participants.seed),
        );
        let plan = plan_assignments(&participants.items, &resources, first_order)?;
        Ok((plan, participants.seed))
    }

    /// Load the checkpoint and check it against durable state, flagging
    /// the event `reset_required` on any mismatch.
    async fn trusted_checkpoint(&self, event_id: EventId, actor: &str) -> Result<DrawCheckpoint> {
        if self.event_status(event_id).await? != EventStatus::Drawing {
            return Err(DrawError::Conflict("no draw in progress to resume".to_string()));
        }

        let checkpoint = match self.checkpoints.load(event_id).await? {
            Some(checkpoint) => checkpoint,
            None => {
                return Err(self
                    .flag_reset_required(event_id, actor, "no checkpoint found")
                    .await);
            }
        };
        if let Err(e) = self.checkpoints.validate(&checkpoint, event_id) {
            return Err(self.flag_reset_required(event_id, actor, &e.to_string()).await);
        }
        if !self.checkpoints.is_resumable(&checkpoint).await? {
            return Err(self
                .flag_reset_required(
                    event_id,
                    actor,
                    "durable assignments do not match the checkpoint",
                )
                .await);
        }
        Ok(checkpoint)
    }

    async fn flag_reset_required(&self, event_id: EventId, actor: &str, reason: &str) -> DrawError {
        error!(%event_id, %reason, "Checkpoint rejected, event requires reset");
        if let Err(e) = self
            .env
            .draws
            .set_event_status(event_id, EventStatus::ResetRequired)
            .await
        {
            error!(%event_id, error = %e, "Failed to flag event for reset");
        }
        self.record_audit(
            event_id,
            "draw.checkpoint_rejected",
            actor,
            json!({ "reason": reason }),
        )
        .await;
        DrawError::CheckpointCorrupted(reason.to_string())
    }

    /// Apply an action to the shared progress. Returns the rejection reason
    /// if the machine refused it.
    fn transition(
        &self,
        progress: &Mutex<DrawProgress>,
        action: DrawAction,
    ) -> std::result::Result<Effects<DrawEffect>, String> {
        let mut state = lock_progress(progress);
        let before = (state.status, state.current_step);
        let effects = self.machine.reduce(&mut state, action, &self.machine_env);
        if (state.status, state.current_step) == before {
            return Err(state
                .last_error
                .clone()
                .unwrap_or_else(|| "transition rejected".to_string()));
        }
        Ok(effects)
    }

    async fn run_effects(
        &self,
        progress: &Mutex<DrawProgress>,
        effects: Effects<DrawEffect>,
    ) -> Result<()> {
        let event_id = lock_progress(progress).event_id;
        for effect in effects {
            match effect {
                DrawEffect::SaveCheckpoint => {
                    let snapshot = lock_progress(progress).clone();
                    self.checkpoints.save(&snapshot).await?;
                }
                DrawEffect::DeleteCheckpoint => self.checkpoints.delete(event_id).await?,
                DrawEffect::SetEventStatus(status) => {
                    self.env.draws.set_event_status(event_id, status).await?;
                }
                DrawEffect::Publish(kind) => self.env.emitter.publish(event_id, kind).await,
            }
        }
        Ok(())
    }

    /// Run effects of a pause or failure; the store may be unreachable, so
    /// errors are only logged.
    async fn run_effects_best_effort(
        &self,
        progress: &Mutex<DrawProgress>,
        effects: Effects<DrawEffect>,
    ) {
        if let Err(e) = self.run_effects(progress, effects).await {
            warn!(error = %e, "Draw side effects incomplete");
        }
    }

    /// Persist remaining steps, then finish. Returns the number of steps
    /// persisted by this call.
    async fn drive(&self, progress: &Arc<Mutex<DrawProgress>>) -> Result<usize> {
        let event_id = lock_progress(progress).event_id;
        let autosave = self.spawn_autosave(Arc::clone(progress));
        let mut created = 0;

        loop {
            if self.take_pause_request(event_id) {
                autosave.stop().await;
                return Err(self.pause(progress, "pause requested".to_string()).await);
            }

            let next = {
                let state = lock_progress(progress);
                state
                    .next_planned()
                    .cloned()
                    .map(|planned| (state.current_step, planned))
            };
            let Some((step, planned)) = next else {
                break;
            };

            let assignment = Assignment::new(
                event_id,
                planned.participant_id,
                planned.resource_id,
                planned.draw_order,
                self.env.clock.now(),
            );
            match self.persist_step(step, assignment).await {
                Ok(stored) => {
                    self.transition(progress, DrawAction::StepPersisted { assignment: stored })
                        .map_err(DrawError::Conflict)?;
                    created += 1;
                    debug!(%event_id, step, "Draw step persisted");
                }
                Err(StepFailure::Paused(reason)) => {
                    autosave.stop().await;
                    warn!(%event_id, step, %reason, "Connection lost, pausing draw");
                    return Err(self.pause(progress, reason).await);
                }
                Err(StepFailure::Failed(failure)) => {
                    autosave.stop().await;
                    error!(%event_id, step, error = %failure, "Draw step failed");
                    if let Ok(effects) = self.transition(
                        progress,
                        DrawAction::Fail {
                            reason: failure.to_string(),
                        },
                    ) {
                        self.run_effects_best_effort(progress, effects).await;
                    }
                    return Err(failure);
                }
            }
        }

        autosave.stop().await;
        let effects = self
            .transition(progress, DrawAction::Finish)
            .map_err(DrawError::Conflict)?;
        self.run_effects(progress, effects).await?;
        Ok(created)
    }

    async fn pause(&self, progress: &Mutex<DrawProgress>, reason: String) -> DrawError {
        if let Ok(effects) = self.transition(progress, DrawAction::Pause { reason }) {
            self.run_effects_best_effort(progress, effects).await;
        }
        let state = lock_progress(progress);
        info!(
            event_id = %state.event_id,
            current_step = state.current_step,
            total_steps = state.total_steps,
            "Draw paused"
        );
        DrawError::Paused {
            current_step: state.current_step,
            total_steps: state.total_steps,
        }
    }

    /// Insert one assignment with retries. A unique violation for the
    /// identical row means an earlier attempt already wrote it.
    async fn persist_step(
        &self,
        step: u32,
        assignment: Assignment,
    ) -> std::result::Result<Assignment, StepFailure> {
        let policy = self.config.step_retry_policy();
        let result = retry_with_predicate(
            &policy,
            || self.env.draws.insert_assignment(assignment.clone()),
            StoreError::is_transient,
        )
        .await;

        let failure = match result {
            Ok(stored) => return Ok(stored),
            Err(failure) => failure,
        };

        if failure.error.is_unique_violation() {
            return match self
                .env
                .draws
                .find_active_assignment(assignment.event_id, assignment.participant_id)
                .await
            {
                Ok(Some(existing))
                    if existing.resource_id == assignment.resource_id
                        && existing.draw_order == assignment.draw_order =>
                {
                    debug!(step, assignment_id = %existing.id, "Step already persisted");
                    Ok(existing)
                }
                Ok(_) => Err(StepFailure::Failed(DrawError::Conflict(format!(
                    "step {step} conflicts with an existing assignment: {}",
                    failure.error
                )))),
                Err(e) if e.is_connection_loss() => Err(StepFailure::Paused(e.to_string())),
                Err(e) => Err(StepFailure::Failed(e.into())),
            };
        }
        if failure.error.is_connection_loss() {
            return Err(StepFailure::Paused(failure.error.to_string()));
        }
        Err(StepFailure::Failed(DrawError::StepFailed {
            step,
            attempts: failure.attempts,
            source: failure.error,
        }))
    }

    fn spawn_autosave(&self, progress: Arc<Mutex<DrawProgress>>) -> Autosave {
        let checkpoints = self.checkpoints.clone();
        let every = self.config.checkpoint_interval.max(Duration::from_millis(10));
        Autosave(Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = lock_progress(&progress).clone();
                if snapshot.status != DrawStatus::Drawing {
                    break;
                }
                if let Err(e) = checkpoints.save(&snapshot).await {
                    warn!(event_id = %snapshot.event_id, error = %e, "Autosave failed");
                }
            }
        })))
    }

    fn take_pause_request(&self, event_id: EventId) -> bool {
        self.pause_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event_id)
    }

    fn mark_running(&self, event_id: EventId) -> RunningGuard<'_> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event_id);
        RunningGuard {
            orchestrator: self,
            event_id,
        }
    }

    async fn audit_completion(
        &self,
        progress: &DrawProgress,
        participant_count: usize,
        resource_count: usize,
    ) {
        self.record_audit(
            progress.event_id,
            "draw.completed",
            &progress.initiated_by,
            json!({
                "seed": progress.seed,
                "participant_count": participant_count,
                "resource_count": resource_count,
                "assignments": progress.assignments.len(),
            }),
        )
        .await;
    }

    async fn record_audit(
        &self,
        event_id: EventId,
        action: &str,
        actor: &str,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry::new(Some(event_id), action, actor, details, self.env.clock.now());
        if let Err(e) = self.env.audit.record(entry).await {
            warn!(%event_id, action, error = %e, "Failed to write audit entry");
        }
    }
}

struct RunningGuard<'a> {
    orchestrator: &'a DrawOrchestrator,
    event_id: EventId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.event_id);
        self.orchestrator
            .pause_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.event_id);
    }
}

fn validate_request(event_id: EventId, actor: &str) -> Result<()> {
    if event_id.is_nil() {
        return Err(DrawError::Validation("event id is required".to_string()));
    }
    if actor.trim().is_empty() {
        return Err(DrawError::Validation("initiated_by is required".to_string()));
    }
    Ok(())
}
