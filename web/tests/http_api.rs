//! HTTP API tests against in-memory adapters.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Duration as ChronoDuration;
use serde_json::{Value, json};
use std::time::Duration;
use sweepstake_core::types::{EventId, LeaseId, LockKey, LockRecord};
use sweepstake_runtime::EngineConfig;
use sweepstake_testing::{TestEngine, init_tracing, test_time};
use sweepstake_web::{ACTOR_HEADER, AppState, CORRELATION_ID_HEADER, build_router};
use tower::ServiceExt;

fn app(engine: &TestEngine) -> Router {
    init_tracing();
    let config = EngineConfig {
        step_retry_initial_delay: Duration::from_millis(1),
        ..EngineConfig::default()
    };
    build_router(AppState::new(engine.environment(), config))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(ACTOR_HEADER, "steward");
    let body = match body {
        Some(value) => {
            request = request.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn draw_uri(event_id: EventId) -> String {
    format!("/api/events/{event_id}/draw")
}

#[tokio::test]
async fn health_reports_ok() {
    let engine = TestEngine::new();
    let (status, body) = send(&app(&engine), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn draw_assigns_every_participant() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(5, 5);
    let app = app(&engine);

    let (status, body) = send(
        &app,
        Method::POST,
        &draw_uri(event_id),
        Some(json!({"seed": "derby"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignments"].as_array().unwrap().len(), 5);
    assert_eq!(body["dryRun"], false);
    assert_eq!(engine.store.active_assignments(event_id).len(), 5);
}

#[tokio::test]
async fn draw_without_body_uses_defaults() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(3, 2);

    let (status, body) = send(&app(&engine), Method::POST, &draw_uri(event_id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assignments"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn second_draw_is_a_conflict() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(4, 2);
    let app = app(&engine);

    let (status, _) = send(&app, Method::POST, &draw_uri(event_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &draw_uri(event_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
    assert_eq!(engine.store.active_assignments(event_id).len(), 4);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(4, 4);

    let (status, body) = send(
        &app(&engine),
        Method::POST,
        &draw_uri(event_id),
        Some(json!({"dryRun": true, "seed": "preview"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dryRun"], true);
    assert_eq!(body["plan"].as_array().unwrap().len(), 4);
    assert!(engine.store.active_assignments(event_id).is_empty());
}

#[tokio::test]
async fn malformed_requests_are_unprocessable() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(2, 2);
    let app = app(&engine);

    let (status, body) = send(&app, Method::POST, "/api/events/not-a-uuid/draw", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &app,
        Method::POST,
        &draw_uri(event_id),
        Some(json!({"drawType": "half"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_event_is_not_found() {
    let engine = TestEngine::new();
    let (status, body) = send(
        &app(&engine),
        Method::GET,
        &draw_uri(EventId::new()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn held_draw_lock_is_reported() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(3, 3);
    engine.store.put_lock(LockRecord {
        key: LockKey::draw(event_id),
        holder: "other-instance".into(),
        lease_id: LeaseId::new(),
        acquired_at: test_time(),
        expires_at: test_time() + ChronoDuration::minutes(5),
        version: 1,
    });

    let (status, body) = send(&app(&engine), Method::POST, &draw_uri(event_id), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "LOCK_HELD");
    assert_eq!(body["details"]["holder"], "other-instance");
}

#[tokio::test]
async fn scratch_reassigns_over_http() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(5, 5);
    let app = app(&engine);
    let (status, _) = send(&app, Method::POST, &draw_uri(event_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/resources/3/scratch"),
        Some(json!({"reason": "vet withdrawal"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scratchedResource"]["withdrawn"], true);
    assert_eq!(body["reassignments"].as_array().unwrap().len(), 1);
    assert_eq!(engine.store.active_assignments(event_id).len(), 5);
    assert!(
        engine
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == "resource.scratched" && entry.actor == "steward")
    );

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/resources/3/scratch"),
        Some(json!({"reason": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn bulk_scratch_rejects_empty_items() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(2, 2);
    let (status, _) = send(
        &app(&engine),
        Method::POST,
        &format!("/api/events/{event_id}/resources/scratch"),
        Some(json!({"items": []})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn force_release_deletes_lock() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(1, 1);
    let key = LockKey::draw(event_id);
    engine.store.put_lock(LockRecord {
        key: key.clone(),
        holder: "crashed-instance".into(),
        lease_id: LeaseId::new(),
        acquired_at: test_time(),
        expires_at: test_time() + ChronoDuration::minutes(5),
        version: 1,
    });
    let app = app(&engine);
    let uri = format!("/api/locks/draw/{event_id}");

    let (status, body) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["holder"], "crashed-instance");

    let (status, body) = send(&app, Method::DELETE, &format!("{uri}?reason=stuck"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released"], true);
    assert!(engine.store.lock(&key).is_none());
    assert!(
        engine
            .store
            .audit_entries()
            .iter()
            .any(|entry| entry.action == "lock.force_released")
    );

    let (status, _) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pause_without_running_draw_is_a_conflict() {
    let engine = TestEngine::new();
    let event_id = engine.seeded_event(2, 2);
    let (status, _) = send(
        &app(&engine),
        Method::POST,
        &format!("/api/events/{event_id}/draw/pause"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn responses_carry_correlation_id() {
    let engine = TestEngine::new();
    let response = app(&engine)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
}
