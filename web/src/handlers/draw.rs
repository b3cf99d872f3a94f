//! Draw endpoints.
//!
//! - `POST /api/events/:event_id/draw` - execute a full, single or dry-run draw
//! - `GET /api/events/:event_id/draw` - draw status and active assignments
//! - `POST /api/events/:event_id/draw/resume` - resume a paused draw
//! - `POST /api/events/:event_id/draw/pause` - ask a running draw to pause
//! - `POST /api/events/:event_id/draw/abandon` - give up on a paused draw
//! - `POST /api/events/:event_id/draw/reset` - administrative reset

use crate::error::AppError;
use crate::extractors::{Actor, EventPath};
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use sweepstake_core::types::EventId;
use sweepstake_runtime::{
    DrawOptions, DrawOutcome, DrawStatusReport, DrawType, ResetOutcome,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of a draw request. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrawRequest {
    /// `"all"` (default) or `"single"`.
    pub draw_type: Option<String>,
    /// Leave withdrawn resources out (default `true`).
    pub skip_withdrawn: Option<bool>,
    /// Only compute the mapping.
    pub dry_run: bool,
    /// Seed for a reproducible draw.
    pub seed: Option<String>,
    /// Actor; falls back to the `X-Actor` header.
    pub initiated_by: Option<String>,
}

impl DrawRequest {
    fn into_options(self, actor: Actor) -> Result<DrawOptions, AppError> {
        let draw_type = match self.draw_type.as_deref() {
            Some(raw) => raw.parse::<DrawType>()?,
            None => DrawType::All,
        };
        Ok(DrawOptions {
            draw_type,
            skip_withdrawn: self.skip_withdrawn.unwrap_or(true),
            dry_run: self.dry_run,
            seed: self.seed.filter(|s| !s.is_empty()),
            initiated_by: self.initiated_by.unwrap_or(actor.0),
        })
    }
}

/// Answer of a pause request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseResponse {
    /// Event asked to pause.
    pub event_id: EventId,
    /// True once the running draw has been told to pause.
    pub pause_requested: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Execute a draw.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/draw \
///   -H "Content-Type: application/json" \
///   -d '{"drawType": "all", "seed": "derby-2025", "initiatedBy": "admin"}'
/// ```
///
/// # Errors
///
/// Engine errors are mapped by [`AppError`]; a draw paused by connectivity
/// loss answers `202 Accepted` with its progress.
pub async fn execute_draw(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    actor: Actor,
    body: Bytes,
) -> Result<Json<DrawOutcome>, AppError> {
    let options = parse_body::<DrawRequest>(&body)?.into_options(actor)?;
    tracing::info!(
        event_id = %event_id,
        draw_type = ?options.draw_type,
        dry_run = options.dry_run,
        initiated_by = %options.initiated_by,
        "Draw requested"
    );
    let outcome = state.orchestrator.execute_draw(event_id, options).await?;
    Ok(Json(outcome))
}

/// Draw status of an event.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn draw_status(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
) -> Result<Json<DrawStatusReport>, AppError> {
    Ok(Json(state.orchestrator.get_draw_status(event_id).await?))
}

/// Resume a paused draw from its checkpoint.
///
/// # Errors
///
/// Returns 409 `RESET_REQUIRED` if the checkpoint cannot be trusted.
pub async fn resume_draw(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    Actor(actor): Actor,
) -> Result<Json<DrawOutcome>, AppError> {
    Ok(Json(state.orchestrator.resume_draw(event_id, &actor).await?))
}

/// Ask the draw running on this instance to pause at its next step.
///
/// # Errors
///
/// Returns 409 if no draw for the event is running here.
#[allow(clippy::unused_async)]
pub async fn pause_draw(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
) -> Result<(StatusCode, Json<PauseResponse>), AppError> {
    if !state.orchestrator.request_pause(event_id) {
        return Err(AppError::conflict(format!(
            "no draw is running for event {event_id}"
        )));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(PauseResponse {
            event_id,
            pause_requested: true,
        }),
    ))
}

/// Abandon a paused draw, leaving the event in `error`.
///
/// # Errors
///
/// Returns 409 unless a draw is in progress.
pub async fn abandon_draw(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    Actor(actor): Actor,
) -> Result<StatusCode, AppError> {
    state.orchestrator.abandon_draw(event_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Administrative reset: soft-delete all assignments and reopen the event.
///
/// # Errors
///
/// Returns 409 for a completed draw.
pub async fn reset_draw(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    Actor(actor): Actor,
) -> Result<Json<ResetOutcome>, AppError> {
    Ok(Json(state.orchestrator.reset_draw(event_id, &actor).await?))
}
