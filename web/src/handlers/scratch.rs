//! Scratch endpoints.
//!
//! - `POST /api/events/:event_id/resources/:number/scratch` - withdraw and reassign
//! - `POST /api/events/:event_id/resources/:number/restore` - undo a withdrawal
//! - `POST /api/events/:event_id/resources/scratch` - scratch several resources

use crate::error::AppError;
use crate::extractors::{Actor, EventPath, parse_event_id};
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Deserialize;
use sweepstake_core::types::{EventId, Resource};
use sweepstake_runtime::{BulkScratchItem, BulkScratchResult, ScratchOptions, ScratchOutcome};

/// Body of a scratch request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScratchRequest {
    /// Why the resource is withdrawn.
    pub reason: String,
    /// Reassignment options.
    #[serde(flatten)]
    pub options: ScratchOptions,
}

/// Body of a bulk scratch request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkScratchRequest {
    /// Resources to scratch, processed in order.
    pub items: Vec<BulkScratchItem>,
    /// Reassignment options applied to every item.
    #[serde(flatten)]
    pub options: ScratchOptions,
}

fn parse_resource_path(event_id: &str, number: &str) -> Result<(EventId, u32), AppError> {
    let event_id = parse_event_id(event_id)?;
    let number = number
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| AppError::validation(format!("invalid resource number: {number}")))?;
    Ok((event_id, number))
}

/// Scratch one resource.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/resources/7/scratch \
///   -H "X-Actor: steward" \
///   -d '{"reason": "vet withdrawal", "autoReassign": true}'
/// ```
///
/// # Errors
///
/// Returns 404 for an unknown resource, 409 if it is already withdrawn and
/// 422 when no other resource can absorb its participants.
pub async fn scratch_resource(
    State(state): State<AppState>,
    Path((event_id, number)): Path<(String, String)>,
    Actor(actor): Actor,
    body: Bytes,
) -> Result<Json<ScratchOutcome>, AppError> {
    let (event_id, number) = parse_resource_path(&event_id, &number)?;
    let request: ScratchRequest = parse_body(&body)?;
    let outcome = state
        .scratches
        .scratch(event_id, number, &request.reason, request.options, &actor)
        .await?;
    Ok(Json(outcome))
}

/// Restore a withdrawn resource. Participants are not moved back.
///
/// # Errors
///
/// Returns 409 if the resource is not withdrawn or the draw has completed.
pub async fn restore_resource(
    State(state): State<AppState>,
    Path((event_id, number)): Path<(String, String)>,
    Actor(actor): Actor,
) -> Result<Json<Resource>, AppError> {
    let (event_id, number) = parse_resource_path(&event_id, &number)?;
    Ok(Json(
        state.scratches.restore(event_id, number, &actor).await?,
    ))
}

/// Scratch several resources, reporting each entry separately.
///
/// # Errors
///
/// Returns 422 for an empty item list; per-item failures are reported in
/// the response body.
pub async fn bulk_scratch(
    State(state): State<AppState>,
    EventPath(event_id): EventPath,
    Actor(actor): Actor,
    body: Bytes,
) -> Result<Json<Vec<BulkScratchResult>>, AppError> {
    let request: BulkScratchRequest = parse_body(&body)?;
    if request.items.is_empty() {
        return Err(AppError::validation("items must not be empty"));
    }
    let results = state
        .scratches
        .bulk_scratch(event_id, request.items, request.options, &actor)
        .await;

    tracing::info!(
        event_id = %event_id,
        requested = results.len(),
        succeeded = results.iter().filter(|r| r.succeeded()).count(),
        "Bulk scratch processed"
    );
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_resource_number_must_be_positive() {
        let event = uuid::Uuid::new_v4().to_string();
        assert_eq!(parse_resource_path(&event, "7").unwrap().1, 7);
        assert!(parse_resource_path(&event, "0").is_err());
        assert!(parse_resource_path(&event, "seven").is_err());
    }

    #[test]
    fn test_scratch_options_default_when_omitted() {
        let request: ScratchRequest =
            parse_body(&Bytes::from_static(b"{\"reason\": \"lame\"}")).unwrap();
        assert_eq!(request.reason, "lame");
        assert_eq!(request.options, ScratchOptions::default());

        let request: ScratchRequest = parse_body(&Bytes::from_static(
            b"{\"reason\": \"lame\", \"autoReassign\": false}",
        ))
        .unwrap();
        assert!(!request.options.auto_reassign);
        assert!(request.options.preserve_draw_order);
    }
}
