//! Server lifecycle: adapters, listeners and graceful shutdown.
//!
//! On a shutdown signal (Ctrl+C or SIGTERM):
//! 1. Both listeners stop accepting connections
//! 2. In-flight requests get `shutdown_timeout` to finish
//! 3. The lock cleanup sweep is stopped

use crate::config::ServerConfig;
use crate::handlers::metrics_router;
use crate::router::build_router;
use crate::sinks::{TracingEmitter, TracingNotifier};
use crate::state::AppState;
use anyhow::Context as _;
use std::sync::Arc;
use sweepstake_core::environment::{EngineEnvironment, SystemClock};
use sweepstake_postgres::PostgresDrawStore;
use sweepstake_redis::RedisCheckpointCache;
use sweepstake_runtime::EngineConfig;
use sweepstake_runtime::metrics::MetricsRecorder;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connect the `PostgreSQL` and Redis adapters and wire the environment.
///
/// # Errors
///
/// Returns an error if either backend is unreachable or migrations fail.
pub async fn connect_environment(config: &ServerConfig) -> anyhow::Result<EngineEnvironment> {
    let store = PostgresDrawStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to PostgreSQL")?;
    store.migrate().await.context("running migrations")?;
    info!("PostgreSQL connected and migrated");

    let cache = RedisCheckpointCache::new(&config.redis_url, config.checkpoint_cache_ttl)
        .await
        .context("connecting to Redis")?;
    info!("Redis checkpoint cache connected");

    let store = Arc::new(store);
    Ok(EngineEnvironment {
        clock: Arc::new(SystemClock),
        draws: store.clone(),
        locks: store.clone(),
        versions: store.clone(),
        checkpoints: store.clone(),
        cache: Arc::new(cache),
        audit: store,
        emitter: Arc::new(TracingEmitter),
        notifier: Arc::new(TracingNotifier),
    })
}

/// Run the API and metrics listeners until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if a listener cannot be bound or the API server fails.
pub async fn run(
    config: ServerConfig,
    engine_config: EngineConfig,
    env: EngineEnvironment,
    recorder: MetricsRecorder,
) -> anyhow::Result<()> {
    let cleanup_interval = engine_config.lock_cleanup_interval;
    let state = AppState::new(env, engine_config);
    let sweep = state.locks.spawn_cleanup_sweep(cleanup_interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_address())
        .await
        .with_context(|| format!("binding metrics listener on {}", config.metrics_address()))?;
    info!(address = %config.metrics_address(), "Metrics endpoint listening");
    let metrics_server = tokio::spawn({
        let mut shutdown_rx = shutdown_rx.clone();
        async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(metrics_listener, metrics_router(recorder))
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Metrics server failed");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding API listener on {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "HTTP server listening for requests");

    let api_server = tokio::spawn({
        let mut shutdown_rx = shutdown_rx;
        let app = build_router(state);
        async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        }
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining requests...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_timeout, api_server).await {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped gracefully"),
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
        Err(_) => warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "HTTP server shutdown timed out"
        ),
    }
    if tokio::time::timeout(config.shutdown_timeout, metrics_server)
        .await
        .is_err()
    {
        warn!("Metrics server shutdown timed out");
    }
    sweep.abort();

    info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
