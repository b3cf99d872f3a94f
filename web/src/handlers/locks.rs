//! Lock administration endpoints.
//!
//! - `GET /api/locks/:resource_type/:resource_id` - live holder of a lock
//! - `DELETE /api/locks/:resource_type/:resource_id` - force-release a lock

use crate::error::AppError;
use crate::extractors::Actor;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sweepstake_core::DrawError;
use sweepstake_core::types::{LockKey, LockRecord};

/// Query parameters of a force-release.
#[derive(Debug, Default, Deserialize)]
pub struct ForceReleaseQuery {
    /// Recorded in the audit entry.
    pub reason: Option<String>,
}

/// Answer of a force-release.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceReleaseResponse {
    /// Lock addressed, as `type:id`.
    pub lock: String,
    /// False if there was no lock to release.
    pub released: bool,
}

/// The live lock on a key.
///
/// # Errors
///
/// Returns 404 when the key is free.
pub async fn lock_status(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> Result<Json<LockRecord>, AppError> {
    let key = LockKey::new(resource_type, resource_id);
    state
        .locks
        .current_holder(&key)
        .await
        .map_err(DrawError::from)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Lock", &key))
}

/// Delete a lock regardless of holder. Audited with the acting operator.
///
/// # Example
///
/// ```bash
/// curl -X DELETE "http://localhost:8080/api/locks/draw/<event_id>?reason=stuck" \
///   -H "X-Actor: admin"
/// ```
///
/// # Errors
///
/// Returns 503 if the lock table is unavailable.
pub async fn force_release(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
    Actor(actor): Actor,
    Query(query): Query<ForceReleaseQuery>,
) -> Result<Json<ForceReleaseResponse>, AppError> {
    let key = LockKey::new(resource_type, resource_id);
    let released = state
        .locks
        .force_release(&key, &actor, query.reason.as_deref())
        .await
        .map_err(DrawError::from)?;
    Ok(Json(ForceReleaseResponse {
        lock: key.to_string(),
        released,
    }))
}
