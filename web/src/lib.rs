//! HTTP surface of the sweepstake draw engine.
//!
//! Handlers are thin: they parse the request, call the orchestrator, the
//! scratch service or the lock manager held in [`AppState`], and map
//! [`sweepstake_core::DrawError`] to a status code through [`AppError`].
//!
//! # Request Flow
//!
//! 1. **Correlation**: [`middleware`] tags the request with a correlation ID
//!    and the acting operator (`X-Actor`)
//! 2. **Extract**: path IDs and the optional JSON body are validated (422)
//! 3. **Execute**: the engine service runs the operation
//! 4. **Map**: the outcome is serialized, or the error becomes
//!    `{code, message, details}` with the matching status
//!
//! # Example
//!
//! ```ignore
//! use sweepstake_web::{AppState, build_router};
//!
//! let state = AppState::new(env, EngineConfig::default());
//! let app = build_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;
pub mod sinks;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use error::AppError;
pub use extractors::{ACTOR_HEADER, Actor, EventPath};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::build_router;
pub use state::AppState;
