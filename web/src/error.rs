//! Error types for web handlers.
//!
//! [`AppError`] bridges engine errors and HTTP responses. Every error body
//! has the shape `{code, message, details?}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use sweepstake_core::{DrawError, StoreError};

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<DrawOutcome>, AppError> {
///     let outcome = orchestrator.execute_draw(event_id, options).await?;
///     Ok(Json(outcome))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Structured context for the client
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach a source error, logged but never sent to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach structured details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
    /// Structured context, when there is any.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

fn store_error(error: StoreError) -> AppError {
    if error.is_transient() || error.is_connection_loss() {
        return AppError::unavailable("Storage is temporarily unavailable")
            .with_source(anyhow::Error::new(error));
    }
    match error {
        StoreError::NotFound(what) => AppError::new(
            StatusCode::NOT_FOUND,
            format!("Record not found: {what}"),
            "NOT_FOUND".to_string(),
        ),
        StoreError::UniqueViolation { .. } => {
            AppError::conflict(error.to_string()).with_source(anyhow::Error::new(error))
        }
        other => AppError::internal("An internal error occurred")
            .with_source(anyhow::Error::new(other)),
    }
}

impl From<DrawError> for AppError {
    fn from(error: DrawError) -> Self {
        let message = error.to_string();
        match error {
            DrawError::Validation(_) => Self::validation(message),
            DrawError::Capacity(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                message,
                "INSUFFICIENT_CAPACITY".to_string(),
            ),
            DrawError::NotFound { entity, id } => Self::not_found(entity, id),
            DrawError::Conflict(_) => Self::conflict(message),
            DrawError::LockHeld {
                key,
                holder,
                expires_at,
            } => Self::new(StatusCode::CONFLICT, message, "LOCK_HELD".to_string()).with_details(
                json!({ "lock": key, "holder": holder, "expiresAt": expires_at }),
            ),
            DrawError::VersionConflict {
                current_version,
                last_modified_by,
            } => Self::new(StatusCode::CONFLICT, message, "VERSION_CONFLICT".to_string())
                .with_details(json!({
                    "currentVersion": current_version,
                    "lastModifiedBy": last_modified_by,
                })),
            DrawError::CheckpointCorrupted(_) => {
                Self::new(StatusCode::CONFLICT, message, "RESET_REQUIRED".to_string())
            }
            DrawError::Paused {
                current_step,
                total_steps,
            } => Self::new(StatusCode::ACCEPTED, message, "DRAW_PAUSED".to_string())
                .with_details(json!({
                    "currentStep": current_step,
                    "totalSteps": total_steps,
                })),
            DrawError::StepFailed {
                step,
                attempts,
                ref source,
            } => {
                let status = if source.is_transient() || source.is_connection_loss() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                Self::new(status, message, "STEP_FAILED".to_string())
                    .with_details(json!({ "step": step, "attempts": attempts }))
                    .with_source(anyhow::Error::new(error))
            }
            DrawError::Store(source) => store_error(source),
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_display() {
        let err = AppError::validation("reason is required");
        assert_eq!(err.to_string(), "[VALIDATION_ERROR] reason is required");
    }

    #[test]
    fn test_draw_errors_map_to_statuses() {
        let cases = [
            (DrawError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DrawError::Capacity("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DrawError::not_found("Event", "e1"), StatusCode::NOT_FOUND),
            (DrawError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                DrawError::LockHeld {
                    key: "draw:e1".into(),
                    holder: "userA".into(),
                    expires_at: Utc::now(),
                },
                StatusCode::CONFLICT,
            ),
            (
                DrawError::VersionConflict {
                    current_version: 3,
                    last_modified_by: None,
                },
                StatusCode::CONFLICT,
            ),
            (
                DrawError::CheckpointCorrupted("checksum".into()),
                StatusCode::CONFLICT,
            ),
            (
                DrawError::Paused {
                    current_step: 2,
                    total_steps: 5,
                },
                StatusCode::ACCEPTED,
            ),
            (
                DrawError::StepFailed {
                    step: 0,
                    attempts: 4,
                    source: StoreError::Timeout("insert".into()),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DrawError::Store(StoreError::Unavailable("pool".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                DrawError::Store(StoreError::Database("syntax".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let label = error.to_string();
            assert_eq!(AppError::from(error).status(), expected, "{label}");
        }
    }

    #[test]
    fn test_lock_held_carries_holder() {
        let err = AppError::from(DrawError::LockHeld {
            key: "draw:e1".into(),
            holder: "userA".into(),
            expires_at: Utc::now(),
        });
        assert_eq!(err.code(), "LOCK_HELD");
        assert_eq!(err.details.as_ref().map(|d| d["holder"].clone()), Some(json!("userA")));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = AppError::from(DrawError::Store(StoreError::Database(
            "relation \"events\" does not exist".into(),
        )));
        assert_eq!(err.to_string(), "[INTERNAL_SERVER_ERROR] An internal error occurred");
        assert!(std::error::Error::source(&err).is_some());
    }
}
