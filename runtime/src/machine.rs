//! Draw lifecycle state machine.
//!
//! ```text
//!   Idle ──Prepare──▶ Preparing ──Start──▶ Drawing ──Finish──▶ Complete
//!    │                    │                 │   ▲
//!    │                    │             Pause│   │
//!    │                    │                 ▼   │
//!    └──────Resume────────┼──────────▶ Paused   │
//!                         │                 │   │
//!                         └─Fail─▶ Error ◀──┴───┘ (Fail from Drawing or Paused)
//! ```
//!
//! [`DrawMachine`] is a pure reducer: it validates each transition against
//! the current [`DrawProgress`] and returns [`DrawEffect`]s for the
//! orchestrator to execute. Rejected transitions leave the progress as it
//! was, record the reason in `last_error` and return no effects.

use smallvec::smallvec;
use std::sync::Arc;
use sweepstake_core::environment::Clock;
use sweepstake_core::reducer::{Effects, Reducer};
use sweepstake_core::types::{
    Assignment, DrawCheckpoint, DrawStatus, DrawStep, EventId, EventStatus, MutationKind,
    PlannedAssignment,
};

/// In-memory progress of one draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawProgress {
    /// Event being drawn.
    pub event_id: EventId,
    /// Lifecycle status.
    pub status: DrawStatus,
    /// Index of the next step to execute.
    pub current_step: u32,
    /// Total steps in the plan.
    pub total_steps: u32,
    /// Completed steps.
    pub steps: Vec<DrawStep>,
    /// Assignments persisted so far.
    pub assignments: Vec<Assignment>,
    /// Full planned mapping.
    pub plan: Vec<PlannedAssignment>,
    /// Seed reported for the draw.
    pub seed: String,
    /// Actor that started the draw.
    pub initiated_by: String,
    /// Reason of the last rejected transition or failure.
    pub last_error: Option<String>,
}

impl DrawProgress {
    /// Fresh progress in [`DrawStatus::Idle`].
    #[must_use]
    pub fn new(event_id: EventId, initiated_by: impl Into<String>) -> Self {
        Self {
            event_id,
            status: DrawStatus::Idle,
            current_step: 0,
            total_steps: 0,
            steps: Vec::new(),
            assignments: Vec::new(),
            plan: Vec::new(),
            seed: String::new(),
            initiated_by: initiated_by.into(),
            last_error: None,
        }
    }

    /// Progress exactly as captured by a checkpoint.
    #[must_use]
    pub fn from_checkpoint(checkpoint: DrawCheckpoint) -> Self {
        Self {
            event_id: checkpoint.event_id,
            status: checkpoint.status,
            current_step: checkpoint.current_step,
            total_steps: checkpoint.total_steps,
            steps: checkpoint.steps,
            assignments: checkpoint.assignments,
            plan: checkpoint.plan,
            seed: checkpoint.seed,
            initiated_by: checkpoint.initiated_by,
            last_error: None,
        }
    }

    /// The plan entry of the next step, if any remain.
    #[must_use]
    pub fn next_planned(&self) -> Option<&PlannedAssignment> {
        usize::try_from(self.current_step)
            .ok()
            .and_then(|step| self.plan.get(step))
    }

    /// True once every planned step is persisted.
    #[must_use]
    pub const fn all_steps_done(&self) -> bool {
        self.current_step >= self.total_steps
    }
}

/// Inputs to the draw state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawAction {
    /// Inputs were loaded; begin preparing.
    Prepare {
        /// Active participants found.
        participant_count: usize,
        /// Drawable resources found.
        resource_count: usize,
    },
    /// The plan is computed; begin stepping.
    Start {
        /// Planned mapping in step order.
        plan: Vec<PlannedAssignment>,
        /// Seed reported for the draw.
        seed: String,
    },
    /// The next step's assignment was persisted.
    StepPersisted {
        /// The stored row.
        assignment: Assignment,
    },
    /// Stop stepping and keep a checkpoint.
    Pause {
        /// Why the draw paused.
        reason: String,
    },
    /// Continue a draw from a checkpoint.
    Resume {
        /// Validated checkpoint.
        checkpoint: DrawCheckpoint,
    },
    /// Abort the draw.
    Fail {
        /// Why the draw failed.
        reason: String,
    },
    /// All steps are persisted.
    Finish,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawEffect {
    /// Write a checkpoint of the current progress.
    SaveCheckpoint,
    /// Delete the event's checkpoints.
    DeleteCheckpoint,
    /// Persist the event's draw status.
    SetEventStatus(EventStatus),
    /// Notify change listeners.
    Publish(MutationKind),
}

/// Dependencies of the state machine.
#[derive(Clone)]
pub struct MachineEnvironment {
    /// Timestamps completed steps.
    pub clock: Arc<dyn Clock>,
}

impl MachineEnvironment {
    /// Create an environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// The draw lifecycle reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawMachine;

impl DrawMachine {
    fn reject(state: &mut DrawProgress, reason: String) -> Effects<DrawEffect> {
        tracing::debug!(event_id = %state.event_id, status = %state.status, %reason, "Draw transition rejected");
        state.last_error = Some(reason);
        Effects::new()
    }
}

impl Reducer for DrawMachine {
    type State = DrawProgress;
    type Action = DrawAction;
    type Effect = DrawEffect;
    type Environment = MachineEnvironment;

    fn reduce(
        &self,
        state: &mut DrawProgress,
        action: DrawAction,
        env: &MachineEnvironment,
    ) -> Effects<DrawEffect> {
        match action {
            DrawAction::Prepare {
                participant_count,
                resource_count,
            } => {
                if state.status != DrawStatus::Idle {
                    return Self::reject(state, format!("cannot prepare a {} draw", state.status));
                }
                if participant_count == 0 {
                    return Self::reject(state, "no active participants to draw".to_string());
                }
                if resource_count == 0 {
                    return Self::reject(state, "no available resources to draw".to_string());
                }
                state.status = DrawStatus::Preparing;
                state.last_error = None;
                Effects::new()
            }

            DrawAction::Start { plan, seed } => {
                if state.status != DrawStatus::Preparing {
                    return Self::reject(state, format!("cannot start a {} draw", state.status));
                }
                let Ok(total_steps) = u32::try_from(plan.len()) else {
                    return Self::reject(state, "draw plan is too large".to_string());
                };
                if total_steps == 0 {
                    return Self::reject(state, "draw plan is empty".to_string());
                }
                state.status = DrawStatus::Drawing;
                state.total_steps = total_steps;
                state.current_step = 0;
                state.plan = plan;
                state.seed = seed;
                smallvec![
                    DrawEffect::SetEventStatus(EventStatus::Drawing),
                    DrawEffect::SaveCheckpoint,
                    DrawEffect::Publish(MutationKind::DrawStarted),
                ]
            }

            DrawAction::StepPersisted { assignment } => {
                if state.status != DrawStatus::Drawing {
                    return Self::reject(state, format!("cannot step a {} draw", state.status));
                }
                let Some(planned) = state.next_planned() else {
                    return Self::reject(state, "all steps already persisted".to_string());
                };
                if planned.participant_id != assignment.participant_id
                    || planned.resource_id != assignment.resource_id
                    || planned.draw_order != assignment.draw_order
                {
                    return Self::reject(
                        state,
                        format!("assignment does not match step {}", state.current_step),
                    );
                }
                state.steps.push(DrawStep {
                    step: state.current_step,
                    assignment_id: assignment.id,
                    participant_id: assignment.participant_id,
                    resource_id: assignment.resource_id,
                    draw_order: assignment.draw_order,
                    completed_at: env.clock.now(),
                });
                state.assignments.push(assignment);
                state.current_step += 1;
                Effects::new()
            }

            DrawAction::Pause { reason } => {
                if state.status != DrawStatus::Drawing {
                    return Self::reject(state, format!("cannot pause a {} draw", state.status));
                }
                state.status = DrawStatus::Paused;
                state.last_error = Some(reason);
                smallvec![
                    DrawEffect::SaveCheckpoint,
                    DrawEffect::Publish(MutationKind::DrawPaused),
                ]
            }

            DrawAction::Resume { checkpoint } => {
                if state.status != DrawStatus::Idle {
                    return Self::reject(state, format!("cannot resume into a {} draw", state.status));
                }
                if checkpoint.event_id != state.event_id {
                    return Self::reject(state, "checkpoint belongs to another event".to_string());
                }
                if !matches!(checkpoint.status, DrawStatus::Drawing | DrawStatus::Paused) {
                    return Self::reject(
                        state,
                        format!("cannot resume a {} checkpoint", checkpoint.status),
                    );
                }
                let initiated_by = std::mem::take(&mut state.initiated_by);
                *state = DrawProgress::from_checkpoint(checkpoint);
                if state.initiated_by.is_empty() {
                    state.initiated_by = initiated_by;
                }
                state.status = DrawStatus::Drawing;
                smallvec![DrawEffect::Publish(MutationKind::DrawResumed)]
            }

            DrawAction::Fail { reason } => {
                if !matches!(
                    state.status,
                    DrawStatus::Preparing | DrawStatus::Drawing | DrawStatus::Paused
                ) {
                    return Self::reject(state, format!("cannot fail a {} draw", state.status));
                }
                let had_plan = !state.plan.is_empty();
                state.status = DrawStatus::Error;
                state.last_error = Some(reason);
                let mut effects: Effects<DrawEffect> =
                    smallvec![DrawEffect::SetEventStatus(EventStatus::Error)];
                if had_plan {
                    effects.push(DrawEffect::SaveCheckpoint);
                }
                effects.push(DrawEffect::Publish(MutationKind::DrawFailed));
                effects
            }

            DrawAction::Finish => {
                if state.status != DrawStatus::Drawing {
                    return Self::reject(state, format!("cannot finish a {} draw", state.status));
                }
                if !state.all_steps_done() {
                    return Self::reject(
                        state,
                        format!(
                            "only {} of {} steps persisted",
                            state.current_step, state.total_steps
                        ),
                    );
                }
                state.status = DrawStatus::Complete;
                state.last_error = None;
                smallvec![
                    DrawEffect::SetEventStatus(EventStatus::Complete),
                    DrawEffect::DeleteCheckpoint,
                    DrawEffect::Publish(MutationKind::DrawCompleted),
                ]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweepstake_core::types::{ParticipantId, ResourceId};
    use sweepstake_testing::reducer_test::assertions::{assert_has_effect, assert_no_effects};
    use sweepstake_testing::{ReducerTest, test_clock, test_time};

    fn env() -> MachineEnvironment {
        MachineEnvironment::new(Arc::new(test_clock()))
    }

    fn plan(steps: u32) -> Vec<PlannedAssignment> {
        (1..=steps)
            .map(|order| PlannedAssignment {
                participant_id: ParticipantId::new(),
                resource_id: ResourceId::new(),
                resource_number: order,
                draw_order: order,
            })
            .collect()
    }

    fn drawing(event_id: EventId, plan: Vec<PlannedAssignment>) -> DrawProgress {
        let mut progress = DrawProgress::new(event_id, "admin");
        progress.status = DrawStatus::Drawing;
        progress.total_steps = u32::try_from(plan.len()).unwrap_or(u32::MAX);
        progress.plan = plan;
        progress
    }

    fn persisted(event_id: EventId, planned: &PlannedAssignment) -> Assignment {
        Assignment::new(
            event_id,
            planned.participant_id,
            planned.resource_id,
            planned.draw_order,
            test_time(),
        )
    }

    #[test]
    fn prepare_then_start_enters_drawing() {
        let event_id = EventId::new();
        let plan = plan(3);
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(DrawProgress::new(event_id, "admin"))
            .when_action(DrawAction::Prepare {
                participant_count: 3,
                resource_count: 2,
            })
            .when_action(DrawAction::Start {
                plan,
                seed: "abc".into(),
            })
            .then_state(|state| {
                assert_eq!(state.status, DrawStatus::Drawing);
                assert_eq!(state.total_steps, 3);
                assert_eq!(state.current_step, 0);
            })
            .then_effects(|effects| {
                assert_has_effect(effects, |e| {
                    *e == DrawEffect::SetEventStatus(EventStatus::Drawing)
                });
                assert_has_effect(effects, |e| *e == DrawEffect::SaveCheckpoint);
            })
            .run();
    }

    #[test]
    fn prepare_rejects_empty_inputs() {
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(DrawProgress::new(EventId::new(), "admin"))
            .when_action(DrawAction::Prepare {
                participant_count: 0,
                resource_count: 4,
            })
            .then_state(|state| {
                assert_eq!(state.status, DrawStatus::Idle);
                assert!(state.last_error.is_some());
            })
            .then_effects(assert_no_effects)
            .run();
    }

    #[test]
    fn steps_advance_in_plan_order() {
        let event_id = EventId::new();
        let plan = plan(2);
        let first = persisted(event_id, &plan[0]);
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(drawing(event_id, plan))
            .when_action(DrawAction::StepPersisted { assignment: first })
            .then_state(|state| {
                assert_eq!(state.current_step, 1);
                assert_eq!(state.steps.len(), 1);
                assert_eq!(state.steps[0].completed_at, test_time());
                assert_eq!(state.assignments.len(), 1);
            })
            .then_effects(assert_no_effects)
            .run();
    }

    #[test]
    fn out_of_order_step_is_rejected() {
        let event_id = EventId::new();
        let plan = plan(2);
        let second = persisted(event_id, &plan[1]);
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(drawing(event_id, plan))
            .when_action(DrawAction::StepPersisted { assignment: second })
            .then_state(|state| {
                assert_eq!(state.current_step, 0);
                assert!(state.last_error.is_some());
            })
            .run();
    }

    #[test]
    fn finish_requires_every_step() {
        let event_id = EventId::new();
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(drawing(event_id, plan(2)))
            .when_action(DrawAction::Finish)
            .then_state(|state| assert_eq!(state.status, DrawStatus::Drawing))
            .then_effects(assert_no_effects)
            .run();
    }

    #[test]
    fn finish_completes_and_drops_checkpoint() {
        let event_id = EventId::new();
        let plan = plan(1);
        let only = persisted(event_id, &plan[0]);
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(drawing(event_id, plan))
            .when_action(DrawAction::StepPersisted { assignment: only })
            .when_action(DrawAction::Finish)
            .then_state(|state| assert_eq!(state.status, DrawStatus::Complete))
            .then_effects(|effects| {
                assert_eq!(
                    effects,
                    [
                        DrawEffect::SetEventStatus(EventStatus::Complete),
                        DrawEffect::DeleteCheckpoint,
                        DrawEffect::Publish(MutationKind::DrawCompleted),
                    ]
                );
            })
            .run();
    }

    #[test]
    fn pause_then_fail_marks_error() {
        let event_id = EventId::new();
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(drawing(event_id, plan(3)))
            .when_action(DrawAction::Pause {
                reason: "connection lost".into(),
            })
            .when_action(DrawAction::Fail {
                reason: "abandoned".into(),
            })
            .then_state(|state| {
                assert_eq!(state.status, DrawStatus::Error);
                assert_eq!(state.last_error.as_deref(), Some("abandoned"));
            })
            .then_effects(|effects| {
                assert_has_effect(effects, |e| {
                    *e == DrawEffect::SetEventStatus(EventStatus::Error)
                });
            })
            .run();
    }

    #[test]
    fn resume_restores_checkpoint_progress() {
        let event_id = EventId::new();
        let plan = plan(4);
        let done = persisted(event_id, &plan[0]);
        let checkpoint = DrawCheckpoint {
            event_id,
            status: DrawStatus::Paused,
            current_step: 1,
            total_steps: 4,
            steps: Vec::new(),
            assignments: vec![done],
            plan,
            seed: "abc".into(),
            initiated_by: "admin".into(),
            saved_at: test_time(),
            checksum: String::new(),
        };
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(DrawProgress::new(event_id, "operator"))
            .when_action(DrawAction::Resume { checkpoint })
            .then_state(|state| {
                assert_eq!(state.status, DrawStatus::Drawing);
                assert_eq!(state.current_step, 1);
                assert_eq!(state.initiated_by, "admin");
                assert_eq!(state.seed, "abc");
            })
            .then_effects(|effects| {
                assert_eq!(effects, [DrawEffect::Publish(MutationKind::DrawResumed)]);
            })
            .run();
    }

    #[test]
    fn completed_draw_cannot_resume() {
        let event_id = EventId::new();
        let mut progress = drawing(event_id, plan(1));
        progress.status = DrawStatus::Complete;
        ReducerTest::new(DrawMachine)
            .with_env(env())
            .given_state(progress)
            .when_action(DrawAction::Pause {
                reason: "late".into(),
            })
            .then_state(|state| assert_eq!(state.status, DrawStatus::Complete))
            .then_effects(assert_no_effects)
            .run();
    }
}
