//! Router configuration.

use crate::handlers::{draw, health::health_check, locks, scratch};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the API router.
///
/// ```text
/// GET    /health
/// POST   /api/events/:event_id/draw
/// GET    /api/events/:event_id/draw
/// POST   /api/events/:event_id/draw/resume
/// POST   /api/events/:event_id/draw/pause
/// POST   /api/events/:event_id/draw/abandon
/// POST   /api/events/:event_id/draw/reset
/// POST   /api/events/:event_id/resources/scratch
/// POST   /api/events/:event_id/resources/:number/scratch
/// POST   /api/events/:event_id/resources/:number/restore
/// GET    /api/locks/:resource_type/:resource_id
/// DELETE /api/locks/:resource_type/:resource_id
/// ```
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Draws
        .route(
            "/events/:event_id/draw",
            post(draw::execute_draw).get(draw::draw_status),
        )
        .route("/events/:event_id/draw/resume", post(draw::resume_draw))
        .route("/events/:event_id/draw/pause", post(draw::pause_draw))
        .route("/events/:event_id/draw/abandon", post(draw::abandon_draw))
        .route("/events/:event_id/draw/reset", post(draw::reset_draw))
        // Scratches
        .route(
            "/events/:event_id/resources/scratch",
            post(scratch::bulk_scratch),
        )
        .route(
            "/events/:event_id/resources/:number/scratch",
            post(scratch::scratch_resource),
        )
        .route(
            "/events/:event_id/resources/:number/restore",
            post(scratch::restore_resource),
        )
        // Locks
        .route(
            "/locks/:resource_type/:resource_id",
            get(locks::lock_status).delete(locks::force_release),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
