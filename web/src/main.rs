//! Sweepstake draw engine HTTP server.

use sweepstake_runtime::EngineConfig;
use sweepstake_runtime::metrics::MetricsRecorder;
use sweepstake_web::{ServerConfig, server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sweepstake=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sweepstake draw server");

    let config = ServerConfig::from_env()?;
    let engine_config = EngineConfig::from_env();
    info!(
        api = %config.bind_address(),
        metrics = %config.metrics_address(),
        lock_ttl_ms = engine_config.lock_ttl.as_millis(),
        checkpoint_interval_ms = engine_config.checkpoint_interval.as_millis(),
        "Configuration loaded"
    );

    let recorder = MetricsRecorder::install()?;
    let env = server::connect_environment(&config).await?;

    server::run(config, engine_config, env, recorder).await
}
