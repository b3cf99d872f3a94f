//! Application state for Axum handlers.

use std::sync::Arc;
use sweepstake_core::environment::EngineEnvironment;
use sweepstake_runtime::{DrawOrchestrator, EngineConfig, LockManager, ScratchService};

/// Engine services shared across all HTTP handlers.
///
/// The orchestrator and the lock endpoints share one [`LockManager`] so a
/// force-release also stops the auto-extension of a running draw.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Full draws, quick draws, resume, abandon and reset.
    pub orchestrator: Arc<DrawOrchestrator>,
    /// Scratch and restore.
    pub scratches: Arc<ScratchService>,
    /// Lock administration.
    pub locks: Arc<LockManager>,
}

impl AppState {
    /// Build every service on top of `env`.
    #[must_use]
    pub fn new(env: EngineEnvironment, config: EngineConfig) -> Self {
        let locks = Arc::new(LockManager::new(&env));
        let write_retry = config.step_retry_policy();
        let orchestrator = Arc::new(DrawOrchestrator::with_lock_manager(
            env.clone(),
            config,
            Arc::clone(&locks),
        ));
        let scratches = Arc::new(ScratchService::new(env).with_retry_policy(write_retry));
        Self {
            orchestrator,
            scratches,
            locks,
        }
    }
}
