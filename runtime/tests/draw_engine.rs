//! End-to-end draw scenarios against the in-memory adapters.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sweepstake_core::DrawError;
use sweepstake_core::StoreError;
use sweepstake_core::environment::Clock;
use sweepstake_core::store::DrawStore;
use sweepstake_core::types::{
    Assignment, EventId, EventStatus, LeaseId, LockKey, LockRecord, MutationKind,
    PlannedAssignment,
};
use sweepstake_runtime::{DrawOptions, DrawOrchestrator, EngineConfig, SINGLE_DRAW_SEED};
use sweepstake_testing::{TestEngine, init_tracing};

fn fast_config() -> EngineConfig {
    EngineConfig {
        step_retry_initial_delay: Duration::from_millis(1),
        step_retry_max_delay: Duration::from_millis(5),
        ..EngineConfig::default()
    }
}

fn orchestrator(engine: &TestEngine) -> DrawOrchestrator {
    init_tracing();
    DrawOrchestrator::new(engine.environment(), fast_config())
}

fn mapping(assignments: &[Assignment]) -> Vec<(String, String, u32)> {
    let mut rows: Vec<_> = assignments
        .iter()
        .map(|a| {
            (
                a.participant_id.to_string(),
                a.resource_id.to_string(),
                a.draw_order,
            )
        })
        .collect();
    rows.sort_by_key(|row| row.2);
    rows
}

fn planned_mapping(plan: &[PlannedAssignment]) -> Vec<(String, String, u32)> {
    let mut rows: Vec<_> = plan
        .iter()
        .map(|p| {
            (
                p.participant_id.to_string(),
                p.resource_id.to_string(),
                p.draw_order,
            )
        })
        .collect();
    rows.sort_by_key(|row| row.2);
    rows
}

async fn paused_draw(engine: &TestEngine, orchestrator: &DrawOrchestrator) -> EventId {
    let event_id = engine.seeded_event(5, 3);
    engine.store.lose_connection_after_inserts(2);
    let result = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin").with_seed("spring-cup"))
        .await;
    assert!(matches!(
        result,
        Err(DrawError::Paused {
            current_step: 2,
            total_steps: 5
        })
    ));
    engine.store.restore_connection();
    event_id
}

#[tokio::test]
async fn five_participants_over_three_resources() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(5, 3);

    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 5);
    assert_eq!(outcome.stats.participant_count, 5);
    assert_eq!(outcome.stats.resource_count, 3);
    assert_eq!(outcome.stats.assignments_created, 5);
    assert_eq!(outcome.stats.seed.len(), 64);

    let orders: Vec<u32> = outcome.assignments.iter().map(|a| a.draw_order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4, 5]);

    let resources: Vec<_> = outcome.assignments.iter().map(|a| a.resource_id).collect();
    assert_eq!(resources[0], resources[3]);
    assert_eq!(resources[1], resources[4]);
    let mut counts: HashMap<_, usize> = HashMap::new();
    for resource in &resources {
        *counts.entry(*resource).or_insert(0) += 1;
    }
    let mut sizes: Vec<usize> = counts.into_values().collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);

    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Complete
    );
    assert!(engine.store.checkpoints(event_id).is_empty());
    assert!(engine.store.lock(&LockKey::draw(event_id)).is_none());
    let kinds = engine.emitter.kinds_for(event_id);
    assert_eq!(kinds.first(), Some(&MutationKind::DrawStarted));
    assert_eq!(kinds.last(), Some(&MutationKind::DrawCompleted));
    assert!(
        engine
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == "draw.completed")
    );
}

#[tokio::test]
async fn second_full_draw_is_a_conflict() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(4, 2);
    orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    let second = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await;

    assert!(matches!(second, Err(DrawError::Conflict(_))));
    assert_eq!(engine.store.active_assignments(event_id).len(), 4);
}

#[tokio::test]
async fn dry_run_writes_nothing_and_is_reproducible() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(7, 3);
    let options = DrawOptions::all("admin").with_seed("derby-2025").dry_run();

    let first = orchestrator
        .execute_draw(event_id, options.clone())
        .await
        .unwrap();
    let second = orchestrator.execute_draw(event_id, options).await.unwrap();

    assert!(first.dry_run);
    assert!(first.assignments.is_empty());
    assert_eq!(first.plan.len(), 7);
    assert_eq!(first.plan, second.plan);
    assert_eq!(first.stats.seed, "derby-2025");
    assert!(engine.store.active_assignments(event_id).is_empty());
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Open
    );
    assert!(engine.store.checkpoints(event_id).is_empty());
    assert!(engine.emitter.kinds_for(event_id).is_empty());
}

#[tokio::test]
async fn seeded_draw_persists_the_dry_run_plan() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(6, 4);
    let preview = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin").with_seed("abc").dry_run())
        .await
        .unwrap();

    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin").with_seed("abc"))
        .await
        .unwrap();

    assert_eq!(mapping(&outcome.assignments), planned_mapping(&preview.plan));
}

#[tokio::test]
async fn empty_event_is_a_capacity_error() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(0, 3);

    let result = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await;

    assert!(matches!(result, Err(DrawError::Capacity(_))));
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Open
    );
    assert!(engine.store.lock(&LockKey::draw(event_id)).is_none());
}

#[tokio::test]
async fn unknown_event_and_blank_actor_are_rejected() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);

    let missing = orchestrator
        .execute_draw(EventId::new(), DrawOptions::all("admin"))
        .await;
    let blank = orchestrator
        .execute_draw(engine.seeded_event(2, 2), DrawOptions::all(""))
        .await;

    assert!(matches!(missing, Err(DrawError::NotFound { .. })));
    assert!(matches!(blank, Err(DrawError::Validation(_))));
}

#[tokio::test]
async fn withdrawn_resources_are_skipped() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.store.create_event("Cup");
    engine.store.add_participants(event_id, 4);
    let resources = engine.store.add_resources(event_id, 3);
    engine.store.withdraw_resource(resources[1].id);

    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    assert_eq!(outcome.skipped_resource_numbers, vec![2]);
    assert_eq!(outcome.stats.resource_count, 2);
    assert!(
        outcome
            .assignments
            .iter()
            .all(|a| a.resource_id != resources[1].id)
    );
}

#[tokio::test]
async fn transient_step_failures_are_retried() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(3, 2);
    engine
        .store
        .fail_next_inserts(2, &StoreError::Timeout("insert".into()));

    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 3);
}

#[tokio::test]
async fn lost_acknowledgement_does_not_duplicate_a_step() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(3, 2);
    engine
        .store
        .fail_next_insert_after_write(StoreError::Timeout("commit ack".into()));

    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 3);
    assert_eq!(engine.store.all_assignments(event_id).len(), 3);
}

#[tokio::test]
async fn exhausted_retries_move_the_draw_to_error() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(3, 2);
    engine
        .store
        .fail_next_inserts(4, &StoreError::Timeout("insert".into()));

    let result = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await;

    match result {
        Err(DrawError::StepFailed { step, attempts, .. }) => {
            assert_eq!(step, 0);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Error
    );
    assert!(engine.store.lock(&LockKey::draw(event_id)).is_none());
    assert!(
        engine
            .emitter
            .kinds_for(event_id)
            .contains(&MutationKind::DrawFailed)
    );
    assert!(matches!(
        orchestrator
            .execute_draw(event_id, DrawOptions::all("admin"))
            .await,
        Err(DrawError::Conflict(_))
    ));
}

#[tokio::test]
async fn connection_loss_pauses_and_resume_finishes_the_same_draw() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(5, 3);
    let preview = orchestrator
        .execute_draw(
            event_id,
            DrawOptions::all("admin").with_seed("spring-cup").dry_run(),
        )
        .await
        .unwrap();

    engine.store.lose_connection_after_inserts(2);
    let paused = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin").with_seed("spring-cup"))
        .await;
    assert!(matches!(paused, Err(DrawError::Paused { .. })));
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Drawing
    );
    assert_eq!(engine.store.active_assignments(event_id).len(), 2);
    assert!(engine.store.lock(&LockKey::draw(event_id)).is_none());

    let status = orchestrator.get_draw_status(event_id).await.unwrap();
    let progress = status.progress.unwrap();
    assert_eq!((progress.current_step, progress.total_steps), (2, 5));

    engine.store.restore_connection();
    let resumed = orchestrator.resume_draw(event_id, "admin").await.unwrap();

    assert_eq!(resumed.assignments.len(), 5);
    assert_eq!(resumed.stats.assignments_created, 3);
    assert_eq!(resumed.stats.seed, "spring-cup");
    assert_eq!(mapping(&resumed.assignments), planned_mapping(&preview.plan));
    assert_eq!(
        mapping(&engine.store.active_assignments(event_id)),
        planned_mapping(&preview.plan)
    );
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Complete
    );
    let kinds = engine.emitter.kinds_for(event_id);
    assert!(kinds.contains(&MutationKind::DrawPaused));
    assert!(kinds.contains(&MutationKind::DrawResumed));
}

#[tokio::test]
async fn new_draw_during_a_paused_one_points_to_resume() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = paused_draw(&engine, &orchestrator).await;

    let result = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await;

    match result {
        Err(DrawError::Conflict(message)) => assert!(message.contains("resume")),
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn tampered_checkpoint_fails_closed() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = paused_draw(&engine, &orchestrator).await;
    engine.cache.set_unavailable(true);
    engine
        .store
        .tamper_latest_checkpoint(event_id, |checkpoint| checkpoint.checksum = "0".repeat(64));

    let result = orchestrator.resume_draw(event_id, "admin").await;

    assert!(matches!(result, Err(DrawError::CheckpointCorrupted(_))));
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::ResetRequired
    );
    assert!(
        engine
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == "draw.checkpoint_rejected")
    );
    assert!(matches!(
        orchestrator.resume_draw(event_id, "admin").await,
        Err(DrawError::Conflict(_))
    ));
}

#[tokio::test]
async fn checkpoint_disagreeing_with_durable_rows_is_rejected() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = paused_draw(&engine, &orchestrator).await;
    let stray = engine.store.add_participants(event_id, 1).remove(0);
    let resource = engine.store.add_resources(event_id, 1).remove(0);
    engine
        .store
        .insert_assignment(Assignment::new(
            event_id,
            stray.id,
            resource.id,
            99,
            engine.clock.now(),
        ))
        .await
        .unwrap();

    let result = orchestrator.resume_draw(event_id, "admin").await;

    assert!(matches!(result, Err(DrawError::CheckpointCorrupted(_))));
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::ResetRequired
    );
}

#[tokio::test]
async fn reset_reopens_the_event() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = paused_draw(&engine, &orchestrator).await;

    let reset = orchestrator.reset_draw(event_id, "steward").await.unwrap();

    assert_eq!(reset.removed_assignments, 2);
    assert_eq!(reset.previous_status, EventStatus::Drawing);
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Open
    );
    assert!(engine.store.active_assignments(event_id).is_empty());
    assert!(engine.store.checkpoints(event_id).is_empty());
    assert!(
        engine
            .emitter
            .kinds_for(event_id)
            .contains(&MutationKind::DrawReset)
    );

    let redraw = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();
    assert_eq!(redraw.assignments.len(), 5);
}

#[tokio::test]
async fn completed_draw_cannot_be_reset() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(2, 2);
    orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();

    let result = orchestrator.reset_draw(event_id, "steward").await;

    assert!(matches!(result, Err(DrawError::Conflict(_))));
}

#[tokio::test]
async fn abandoning_a_paused_draw_marks_error() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = paused_draw(&engine, &orchestrator).await;

    orchestrator.abandon_draw(event_id, "steward").await.unwrap();

    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Error
    );
    assert_eq!(engine.store.active_assignments(event_id).len(), 2);
    assert!(matches!(
        orchestrator.resume_draw(event_id, "admin").await,
        Err(DrawError::Conflict(_))
    ));
}

#[tokio::test]
async fn resume_without_a_running_draw_is_a_conflict() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(2, 2);

    let result = orchestrator.resume_draw(event_id, "admin").await;

    assert!(matches!(result, Err(DrawError::Conflict(_))));
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Open
    );
}

#[tokio::test]
async fn live_lock_blocks_draw_until_it_expires() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.seeded_event(3, 2);
    let now = engine.clock.now();
    engine.store.put_lock(LockRecord {
        key: LockKey::draw(event_id),
        holder: "other-node".into(),
        lease_id: LeaseId::new(),
        acquired_at: now,
        expires_at: now + chrono::Duration::seconds(30),
        version: 1,
    });

    let blocked = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await;
    match blocked {
        Err(DrawError::LockHeld { holder, .. }) => assert_eq!(holder, "other-node"),
        other => panic!("expected LockHeld, got {other:?}"),
    }

    engine.clock.advance(Duration::from_secs(31));
    let outcome = orchestrator
        .execute_draw(event_id, DrawOptions::all("admin"))
        .await
        .unwrap();
    assert_eq!(outcome.assignments.len(), 3);
}

#[tokio::test]
async fn single_draws_fill_the_least_loaded_resource() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.store.create_event("Cup");
    let participants = engine.store.add_participants(event_id, 3);
    let resources = engine.store.add_resources(event_id, 2);

    let mut drawn = Vec::new();
    for _ in 0..3 {
        let outcome = orchestrator
            .execute_draw(event_id, DrawOptions::single("admin"))
            .await
            .unwrap();
        drawn.extend(outcome.assignments);
    }

    let rows: Vec<_> = drawn
        .iter()
        .map(|a| (a.participant_id, a.resource_id, a.draw_order))
        .collect();
    assert_eq!(
        rows,
        vec![
            (participants[0].id, resources[0].id, 1),
            (participants[1].id, resources[1].id, 2),
            (participants[2].id, resources[0].id, 3),
        ]
    );
    assert_eq!(
        engine.store.event(event_id).unwrap().status,
        EventStatus::Open
    );
    assert!(matches!(
        orchestrator
            .execute_draw(event_id, DrawOptions::single("admin"))
            .await,
        Err(DrawError::Conflict(_))
    ));
    assert!(
        engine
            .emitter
            .kinds_for(event_id)
            .iter()
            .all(|kind| *kind == MutationKind::AssignmentCreated)
    );
}

#[tokio::test]
async fn requested_pause_stops_at_a_step_boundary() {
    let engine = TestEngine::new();
    let orchestrator = Arc::new(orchestrator(&engine));
    let event_id = engine.seeded_event(10, 3);
    engine
        .store
        .set_insert_delay(Some(Duration::from_millis(20)));

    let running = Arc::clone(&orchestrator);
    let draw = tokio::spawn(async move {
        running
            .execute_draw(event_id, DrawOptions::all("admin"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(orchestrator.request_pause(event_id));

    let result = draw.await.unwrap();
    let Err(DrawError::Paused {
        current_step,
        total_steps,
    }) = result
    else {
        panic!("expected Paused, got {result:?}");
    };
    assert_eq!(total_steps, 10);
    assert!(current_step < 10);
    assert_eq!(
        engine.store.active_assignments(event_id).len(),
        usize::try_from(current_step).unwrap()
    );

    engine.store.set_insert_delay(None);
    let resumed = orchestrator.resume_draw(event_id, "admin").await.unwrap();
    assert_eq!(resumed.assignments.len(), 10);
}

#[tokio::test]
async fn pause_request_without_a_running_draw_is_ignored() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);

    assert!(!orchestrator.request_pause(engine.seeded_event(2, 2)));
}

#[tokio::test]
async fn single_dry_run_previews_the_next_pick() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.store.create_event("Cup");
    let participants = engine.store.add_participants(event_id, 3);
    let resources = engine.store.add_resources(event_id, 2);
    orchestrator
        .execute_draw(event_id, DrawOptions::single("admin"))
        .await
        .unwrap();

    let preview = orchestrator
        .execute_draw(event_id, DrawOptions::single("admin").dry_run())
        .await
        .unwrap();

    assert!(preview.dry_run);
    assert!(preview.assignments.is_empty());
    assert_eq!(
        planned_mapping(&preview.plan),
        vec![(
            participants[1].id.to_string(),
            resources[1].id.to_string(),
            2
        )]
    );
    assert_eq!(preview.stats.seed, SINGLE_DRAW_SEED);
    assert_eq!(engine.store.active_assignments(event_id).len(), 1);

    let drawn = orchestrator
        .execute_draw(event_id, DrawOptions::single("admin"))
        .await
        .unwrap();
    assert_eq!(drawn.plan, preview.plan);
    assert_eq!(drawn.stats.seed, SINGLE_DRAW_SEED);

    let seeded = orchestrator
        .execute_draw(
            event_id,
            DrawOptions::single("admin").with_seed("heat-3").dry_run(),
        )
        .await
        .unwrap();
    assert_eq!(seeded.stats.seed, "heat-3");
    assert_eq!(seeded.plan[0].participant_id, participants[2].id);
}

#[tokio::test]
async fn withdrawn_resources_are_drawn_onto_when_not_skipped() {
    let engine = TestEngine::new();
    let orchestrator = orchestrator(&engine);
    let event_id = engine.store.create_event("Cup");
    engine.store.add_participants(event_id, 4);
    let resources = engine.store.add_resources(event_id, 2);
    engine.store.withdraw_resource(resources[1].id);
    let options = DrawOptions {
        skip_withdrawn: false,
        ..DrawOptions::all("admin")
    };

    let outcome = orchestrator.execute_draw(event_id, options).await.unwrap();

    assert!(outcome.skipped_resource_numbers.is_empty());
    assert_eq!(outcome.stats.resource_count, 2);
    let on_withdrawn = engine
        .store
        .active_assignments(event_id)
        .iter()
        .filter(|a| a.resource_id == resources[1].id)
        .count();
    assert_eq!(on_withdrawn, 2);
    assert!(engine.store.resource(resources[1].id).unwrap().withdrawn);
}

#[tokio::test]
async fn autosave_checkpoints_a_running_draw() {
    init_tracing();
    let engine = TestEngine::new();
    let config = EngineConfig {
        checkpoint_interval: Duration::from_millis(15),
        ..fast_config()
    };
    let orchestrator = Arc::new(DrawOrchestrator::new(engine.environment(), config));
    let event_id = engine.seeded_event(20, 4);
    engine
        .store
        .set_insert_delay(Some(Duration::from_millis(10)));

    let running = Arc::clone(&orchestrator);
    let draw = tokio::spawn(async move {
        running
            .execute_draw(event_id, DrawOptions::all("admin"))
            .await
    });

    let mut autosaved = Vec::new();
    for _ in 0..200 {
        autosaved = engine
            .store
            .checkpoints(event_id)
            .iter()
            .map(|c| c.current_step)
            .filter(|step| *step > 0)
            .collect();
        if autosaved.first() < autosaved.last() || draw.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(
        autosaved.first() < autosaved.last(),
        "autosaved steps: {autosaved:?}"
    );
    assert!(autosaved.windows(2).all(|pair| pair[0] <= pair[1]));

    let outcome = draw.await.unwrap().unwrap();
    assert_eq!(outcome.assignments.len(), 20);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(engine.store.checkpoints(event_id).is_empty());
}
