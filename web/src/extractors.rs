//! Custom Axum extractors.
//!
//! - [`Actor`]: who is performing an administrative request
//! - [`EventPath`]: event id path segment parsed into an [`EventId`]

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use sweepstake_core::types::EventId;
use uuid::Uuid;

/// Header naming the acting operator.
pub const ACTOR_HEADER: &str = "X-Actor";

/// Actor recorded in audit entries and lock holders.
///
/// Taken from the `X-Actor` header; requests without it act as `"system"`.
///
/// # Example
///
/// ```ignore
/// async fn handler(actor: Actor) -> String {
///     format!("Acting as {}", actor.0)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("system");

        Ok(Self(actor.to_string()))
    }
}

/// Parse an event id path segment, rejecting malformed ids with a 422.
pub(crate) fn parse_event_id(raw: &str) -> Result<EventId, AppError> {
    Uuid::parse_str(raw)
        .map(EventId::from_uuid)
        .map_err(|_| AppError::validation(format!("invalid event id: {raw}")))
}

/// The `event_id` segment of `/api/events/:event_id/...` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPath(pub EventId);

#[async_trait]
impl<S> FromRequestParts<S> for EventPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        parse_event_id(&raw).map(Self)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_actor_from_header() {
        let (mut parts, ()) = Request::builder()
            .header(ACTOR_HEADER, "steward")
            .body(())
            .unwrap()
            .into_parts();

        let Actor(actor) = Actor::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(actor, "steward");
    }

    #[tokio::test]
    async fn test_actor_defaults_to_system() {
        let (mut parts, ()) = Request::builder()
            .header(ACTOR_HEADER, "   ")
            .body(())
            .unwrap()
            .into_parts();

        let Actor(actor) = Actor::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(actor, "system");
    }

    #[test]
    fn test_malformed_event_id_is_rejected() {
        assert!(parse_event_id("not-a-uuid").is_err());
        assert!(parse_event_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
