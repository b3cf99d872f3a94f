//! Prometheus metrics for the draw engine.
//!
//! Engine services record through the `metrics` facade; nothing is exported
//! until a recorder is installed, e.g. with [`MetricsRecorder::install`] in
//! the server binary.
//!
//! # Example
//!
//! ```rust,no_run
//! use sweepstake_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = MetricsRecorder::install()?;
//! let text = recorder.render(); // Prometheus exposition format
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Describe all engine metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn install() -> Result<Self, MetricsError> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");
        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "sweepstake_draws_total",
        "Draw executions by outcome (completed, paused, failed, conflict)"
    );
    describe_counter!(
        "sweepstake_assignments_created_total",
        "Assignments persisted by draws, quick draws and reassignments"
    );
    describe_counter!(
        "sweepstake_lock_conflicts_total",
        "Lock acquisitions refused because another holder owned the lock"
    );
    describe_counter!(
        "sweepstake_scratches_total",
        "Resources scratched"
    );
    describe_counter!(
        "sweepstake_checkpoints_saved_total",
        "Draw checkpoints written"
    );
    describe_histogram!(
        "sweepstake_draw_duration_seconds",
        "Wall time of draw executions"
    );
}

/// Draw engine metrics recorder.
pub struct DrawMetrics;

impl DrawMetrics {
    /// Record the end of a draw execution.
    pub fn record_draw(outcome: &'static str, duration: Duration) {
        counter!("sweepstake_draws_total", "outcome" => outcome).increment(1);
        histogram!("sweepstake_draw_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record persisted assignments.
    pub fn record_assignments(count: usize) {
        counter!("sweepstake_assignments_created_total")
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Record a refused lock acquisition.
    pub fn record_lock_conflict(resource_type: &str) {
        counter!("sweepstake_lock_conflicts_total", "resource_type" => resource_type.to_string())
            .increment(1);
    }

    /// Record a scratch.
    pub fn record_scratch(reassigned: bool) {
        counter!(
            "sweepstake_scratches_total",
            "reassigned" => if reassigned { "true" } else { "false" }
        )
        .increment(1);
    }

    /// Record a checkpoint write.
    pub fn record_checkpoint() {
        counter!("sweepstake_checkpoints_saved_total").increment(1);
    }
}
