//! HTTP request handlers.
//!
//! This module contains all HTTP handlers organized by domain.

pub mod draw;
pub mod health;
pub mod locks;
pub mod scratch;

use crate::error::AppError;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

pub use health::{health_check, metrics_router};

/// Decode an optional JSON body; an empty body yields `T::default()`.
pub(crate) fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::validation(format!("invalid body: {e}")))
}
